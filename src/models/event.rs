use serde::Serialize;

use crate::models::answer::Pass;
use crate::orchestrator::state::AnalysisState;

/// 进度事件，由编排层发出，外部传输层消费
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    StateChanged {
        from: AnalysisState,
        to: AnalysisState,
    },
    PersonaCreated {
        section_id: String,
        specialization: String,
        fallback: bool,
    },
    WindowStarted {
        pass: Pass,
        window_index: usize,
        total_windows: usize,
        pages: Vec<u32>,
    },
    WindowEmpty {
        pass: Pass,
        window_index: usize,
        pages: Vec<u32>,
    },
    ExpertsDispatched {
        pass: Pass,
        window_index: usize,
        experts: Vec<String>,
    },
    ExpertsCompleted {
        pass: Pass,
        window_index: usize,
        succeeded: usize,
        failed: usize,
        answers: usize,
    },
    WindowIngested {
        pass: Pass,
        window_index: usize,
        total_windows: usize,
        answered: usize,
        total_questions: usize,
    },
    PassComplete {
        pass: Pass,
        answered: usize,
        unanswered: usize,
    },
    Cancelled {
        state: AnalysisState,
    },
    Error {
        message: String,
        fatal: bool,
    },
    Completed {
        coverage_pct: f64,
        answered: usize,
        total_questions: usize,
    },
}

impl ProgressEvent {
    /// 事件名，供传输层路由
    pub fn name(&self) -> &'static str {
        match self {
            ProgressEvent::StateChanged { .. } => "state_changed",
            ProgressEvent::PersonaCreated { .. } => "persona_created",
            ProgressEvent::WindowStarted { .. } => "window_started",
            ProgressEvent::WindowEmpty { .. } => "window_empty",
            ProgressEvent::ExpertsDispatched { .. } => "experts_dispatched",
            ProgressEvent::ExpertsCompleted { .. } => "experts_completed",
            ProgressEvent::WindowIngested { .. } => "window_ingested",
            ProgressEvent::PassComplete { .. } => "pass_complete",
            ProgressEvent::Cancelled { .. } => "cancelled",
            ProgressEvent::Error { .. } => "error",
            ProgressEvent::Completed { .. } => "completed",
        }
    }
}
