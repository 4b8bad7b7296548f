//! 分析会话：调用方持有，用于取消与接收进度事件

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;

use crate::infrastructure::progress::ProgressEmitter;
use crate::models::event::ProgressEvent;

/// 取消句柄，可跨任务克隆
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 一次分析的会话
#[derive(Debug, Clone)]
pub struct AnalysisSession {
    id: String,
    cancel: CancelHandle,
    events: ProgressEmitter,
}

impl AnalysisSession {
    /// 创建会话与事件接收端
    pub fn new() -> (Self, UnboundedReceiver<ProgressEvent>) {
        let (events, rx) = ProgressEmitter::channel();
        (Self::with_emitter(events), rx)
    }

    /// 不接收进度事件的会话
    pub fn detached() -> Self {
        Self::with_emitter(ProgressEmitter::disabled())
    }

    fn with_emitter(events: ProgressEmitter) -> Self {
        Self {
            id: format!("analysis-{}", chrono::Local::now().format("%Y%m%d-%H%M%S%.3f")),
            cancel: CancelHandle::default(),
            events,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn events(&self) -> &ProgressEmitter {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_handle_is_shared() {
        let session = AnalysisSession::detached();
        let handle = session.cancel_handle();
        assert!(!session.is_cancelled());

        handle.cancel();
        assert!(session.is_cancelled());
        assert!(session.id().starts_with("analysis-"));
    }
}
