//! 窗口处理流程 - 流程层
//!
//! 核心职责：定义"一个窗口"在某一轮中的完整处理流程
//!
//! 流程顺序：
//! 1. 检查窗口是否有可用文本（空窗口跳过，不中断）
//! 2. 调度所有专家
//! 3. 第二轮只保留目标问题的答案
//! 4. 摄入累积器，发出进度事件

use tracing::{info, warn};

use crate::infrastructure::progress::ProgressEmitter;
use crate::models::answer::Pass;
use crate::models::document::DocumentWindow;
use crate::models::event::ProgressEvent;
use crate::services::accumulator::{AnswerAccumulator, IngestReport};
use crate::services::dispatcher::{ExpertAssignment, MultiExpertDispatcher};
use crate::services::second_pass::SecondPassEnhancer;
use crate::services::token_budget::TokenBudgetTracker;
use crate::workflow::window_ctx::WindowCtx;

/// 一轮的调度参数
#[derive(Debug, Clone, Copy)]
pub struct PassSpec<'a> {
    pub pass: Pass,
    pub assignments: &'a [ExpertAssignment],
    pub min_confidence: f64,
    /// 第二轮的目标过滤
    pub targets: Option<&'a SecondPassEnhancer>,
}

/// 窗口处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowOutcome {
    /// 窗口没有可用文本
    Empty,
    Processed(WindowSummary),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// 第二轮丢弃的非目标答案
    pub discarded: usize,
    pub ingest: IngestReport,
}

/// 窗口处理流程
///
/// - 不持有累积器与预算，由编排层逐窗口借入
/// - 只依赖业务能力（services）
pub struct WindowFlow<'a> {
    dispatcher: &'a MultiExpertDispatcher,
    verbose_logging: bool,
}

impl<'a> WindowFlow<'a> {
    pub fn new(dispatcher: &'a MultiExpertDispatcher, verbose_logging: bool) -> Self {
        Self {
            dispatcher,
            verbose_logging,
        }
    }

    pub async fn run(
        &self,
        window: &DocumentWindow,
        spec: PassSpec<'_>,
        accumulator: &mut AnswerAccumulator,
        budget: &mut TokenBudgetTracker,
        events: &ProgressEmitter,
    ) -> WindowOutcome {
        let ctx = WindowCtx::new(spec.pass, window);

        events.emit(ProgressEvent::WindowStarted {
            pass: spec.pass,
            window_index: window.index,
            total_windows: window.total_windows,
            pages: window.pages.clone(),
        });

        // ========== 1. 空窗口 ==========
        if let Err(e) = window.evidence() {
            warn!("{} ⚠️ {}，跳过", ctx, e);
            events.emit(ProgressEvent::WindowEmpty {
                pass: spec.pass,
                window_index: window.index,
                pages: window.pages.clone(),
            });
            return WindowOutcome::Empty;
        }

        // ========== 2. 调度专家 ==========
        info!("{} 🔍 调度 {} 位专家...", ctx, spec.assignments.len());
        events.emit(ProgressEvent::ExpertsDispatched {
            pass: spec.pass,
            window_index: window.index,
            experts: spec
                .assignments
                .iter()
                .map(|a| a.section_id().to_string())
                .collect(),
        });

        let dispatch = self
            .dispatcher
            .dispatch(window, spec.assignments, spec.pass, spec.min_confidence, budget)
            .await;

        for outcome in &dispatch.outcomes {
            if let Some(error) = &outcome.error {
                events.emit(ProgressEvent::Error {
                    message: format!("{} [章节 {}] {}", ctx, outcome.section_id, error),
                    fatal: false,
                });
            }
        }
        events.emit(ProgressEvent::ExpertsCompleted {
            pass: spec.pass,
            window_index: window.index,
            succeeded: dispatch.succeeded(),
            failed: dispatch.failed(),
            answers: dispatch.answers.len(),
        });

        let succeeded = dispatch.succeeded();
        let failed = dispatch.failed();

        // ========== 3. 目标过滤 ==========
        let (answers, discarded) = match spec.targets {
            Some(targets) => targets.retain_targets(dispatch.answers),
            None => (dispatch.answers, 0),
        };

        // ========== 4. 摄入 ==========
        let ingest = accumulator.ingest(answers);
        let answered = accumulator.answered_count();
        let total_questions = accumulator.enabled_question_count();

        info!(
            "{} ✓ 专家 {}/{} 成功，接受 {} 条答案，新回答 {} 题 (累计 {}/{})",
            ctx,
            succeeded,
            succeeded + failed,
            ingest.accepted,
            ingest.newly_answered.len(),
            answered,
            total_questions
        );
        if self.verbose_logging && !ingest.newly_answered.is_empty() {
            info!("{} 新回答: {}", ctx, ingest.newly_answered.join(", "));
        }

        events.emit(ProgressEvent::WindowIngested {
            pass: spec.pass,
            window_index: window.index,
            total_windows: window.total_windows,
            answered,
            total_questions,
        });

        WindowOutcome::Processed(WindowSummary {
            succeeded,
            failed,
            discarded,
            ingest,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::config::Config;
    use crate::models::question::fixtures::question_set;
    use crate::services::accumulator::MergeThresholds;
    use crate::services::persona_cache::ExpertPersona;
    use crate::services::similarity::WordOverlapSimilarity;
    use crate::test_support::ScriptedModel;

    fn window(has_evidence: bool) -> DocumentWindow {
        DocumentWindow {
            index: 0,
            pages: vec![1, 2, 3],
            text: if has_evidence {
                "[Page 1]\nResin: vinyl ester".to_string()
            } else {
                "[Page 1]\n\n\n[Page 2]\n\n\n[Page 3]\n".to_string()
            },
            total_windows: 1,
            has_evidence,
        }
    }

    #[tokio::test]
    async fn test_window_flow_ingests_and_emits_events() {
        let set = question_set(&[("a", true, 2)]);
        let model = Arc::new(ScriptedModel::new(|_, _| {
            Ok(r#"{"answers":[{"question_id":"a-q1","answer":"Vinyl ester","pages":[1],"confidence":0.9}]}"#.to_string())
        }));
        let dispatcher = MultiExpertDispatcher::new(model, 5, Duration::from_secs(5));
        let flow = WindowFlow::new(&dispatcher, false);
        let assignments = vec![ExpertAssignment {
            persona: Arc::new(ExpertPersona::generic(&set.sections[0])),
            questions: set.sections[0].questions.clone(),
        }];
        let mut acc = AnswerAccumulator::new(&set, Arc::new(WordOverlapSimilarity), MergeThresholds::default());
        let mut budget = TokenBudgetTracker::new(&Config::default());
        let (events, mut rx) = ProgressEmitter::channel();

        let spec = PassSpec {
            pass: Pass::First,
            assignments: &assignments,
            min_confidence: 0.3,
            targets: None,
        };
        let outcome = flow.run(&window(true), spec, &mut acc, &mut budget, &events).await;

        let WindowOutcome::Processed(summary) = outcome else {
            panic!("window should be processed");
        };
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.ingest.newly_answered, ["a-q1"]);
        assert!(acc.is_answered("a-q1"));

        drop(events);
        let mut names = Vec::new();
        while let Some(event) = rx.recv().await {
            names.push(event.name());
        }
        assert_eq!(
            names,
            ["window_started", "experts_dispatched", "experts_completed", "window_ingested"]
        );
    }

    #[tokio::test]
    async fn test_empty_window_is_skipped_without_calls() {
        let set = question_set(&[("a", true, 1)]);
        let model = Arc::new(ScriptedModel::new(|_, _| Ok("[]".to_string())));
        let dispatcher = MultiExpertDispatcher::new(model.clone(), 5, Duration::from_secs(5));
        let flow = WindowFlow::new(&dispatcher, false);
        let assignments = vec![ExpertAssignment {
            persona: Arc::new(ExpertPersona::generic(&set.sections[0])),
            questions: set.sections[0].questions.clone(),
        }];
        let mut acc = AnswerAccumulator::new(&set, Arc::new(WordOverlapSimilarity), MergeThresholds::default());
        let mut budget = TokenBudgetTracker::new(&Config::default());

        let spec = PassSpec {
            pass: Pass::First,
            assignments: &assignments,
            min_confidence: 0.3,
            targets: None,
        };
        let outcome = flow
            .run(&window(false), spec, &mut acc, &mut budget, &ProgressEmitter::disabled())
            .await;

        assert_eq!(outcome, WindowOutcome::Empty);
        assert_eq!(model.calls(), 0);
    }
}
