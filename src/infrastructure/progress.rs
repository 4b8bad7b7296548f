//! 进度事件通道 - 基础设施层
//!
//! 持有事件发送端，只暴露"发出一个事件"的能力。
//! 接收端被丢弃后发送静默失败，不影响分析本身。

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::debug;

use crate::models::event::ProgressEvent;

/// 进度事件发送端
#[derive(Debug, Clone, Default)]
pub struct ProgressEmitter {
    tx: Option<UnboundedSender<ProgressEvent>>,
}

impl ProgressEmitter {
    /// 创建通道，返回 (发送端, 接收端)
    pub fn channel() -> (Self, UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// 不发送任何事件
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: ProgressEvent) {
        debug!("进度事件: {}", event.name());
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}
