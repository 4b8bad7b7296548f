//! 分析状态机
//!
//! ```text
//! Ingest → PersonasReady → WindowLoop → Accumulated ─┬→ SecondPass → Compiled → Done
//!    │           │              │                    └──────────────→ Compiled
//!    └───────────┴──────────────┴→ Failed
//! ```

use std::fmt;

use serde::Serialize;
use tracing::{debug, error};

use crate::error::{AppError, AppResult};
use crate::infrastructure::progress::ProgressEmitter;
use crate::models::event::ProgressEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisState {
    Ingest,
    PersonasReady,
    WindowLoop,
    Accumulated,
    SecondPass,
    Compiled,
    Done,
    Failed,
}

impl AnalysisState {
    pub fn can_transition_to(self, next: AnalysisState) -> bool {
        use AnalysisState::*;
        matches!(
            (self, next),
            (Ingest, PersonasReady)
                | (PersonasReady, WindowLoop)
                | (WindowLoop, Accumulated)
                | (Accumulated, SecondPass)
                | (Accumulated, Compiled)
                | (SecondPass, Compiled)
                | (Compiled, Done)
                | (Ingest | PersonasReady | WindowLoop, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, AnalysisState::Done | AnalysisState::Failed)
    }
}

impl fmt::Display for AnalysisState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AnalysisState::Ingest => "加载",
            AnalysisState::PersonasReady => "人设就绪",
            AnalysisState::WindowLoop => "窗口循环",
            AnalysisState::Accumulated => "已累积",
            AnalysisState::SecondPass => "第二轮",
            AnalysisState::Compiled => "已编译",
            AnalysisState::Done => "完成",
            AnalysisState::Failed => "失败",
        };
        f.write_str(label)
    }
}

/// 状态机：每次合法转换发出一个 `StateChanged` 事件
#[derive(Debug)]
pub struct StateMachine {
    state: AnalysisState,
    events: ProgressEmitter,
}

impl StateMachine {
    pub fn new(events: ProgressEmitter) -> Self {
        Self {
            state: AnalysisState::Ingest,
            events,
        }
    }

    pub fn state(&self) -> AnalysisState {
        self.state
    }

    pub fn transition(&mut self, next: AnalysisState) -> AppResult<()> {
        let from = self.state;
        if !from.can_transition_to(next) {
            error!("非法状态转换: {} → {}", from, next);
            return Err(AppError::OrchestrationFatal(format!(
                "非法状态转换: {} → {}",
                from, next
            )));
        }

        debug!("状态: {} → {}", from, next);
        self.state = next;
        self.events.emit(ProgressEvent::StateChanged { from, to: next });
        Ok(())
    }
}
