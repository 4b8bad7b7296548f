//! 单次分析编排器 - 编排层
//!
//! ## 职责
//!
//! 驱动一次完整的分析：加载 → 人设 → 第一轮窗口循环 → (第二轮) → 编译结果。
//!
//! ## 资源
//!
//! - 唯一持有累积器、token 预算和人设缓存的地方
//! - 窗口严格按顺序处理：上一个窗口的结果摄入后才开始下一个
//! - 并发只发生在单个窗口内部的专家调度
//! - 每个窗口之间、两轮之间检查取消标志，取消后仍编译部分结果

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::infrastructure::llm_client::LanguageModel;
use crate::models::answer::Pass;
use crate::models::document::{DocumentWindow, Page};
use crate::models::event::ProgressEvent;
use crate::models::loaders::{parse_question_set, QuestionSetFormat};
use crate::models::question::{QuestionSet, Section};
use crate::models::result::AnalysisResult;
use crate::orchestrator::session::AnalysisSession;
use crate::orchestrator::state::{AnalysisState, StateMachine};
use crate::services::accumulator::{AnswerAccumulator, MergeThresholds};
use crate::services::dispatcher::{ExpertAssignment, MultiExpertDispatcher};
use crate::services::persona_cache::ExpertPersonaCache;
use crate::services::result_compiler::{compile, RunMetrics};
use crate::services::second_pass::{SecondPassEnhancer, SecondPassReport};
use crate::services::similarity::{TextSimilarity, WordOverlapSimilarity};
use crate::services::token_budget::{TokenBudgetTracker, UsageSnapshot};
use crate::services::windower::DocumentWindower;
use crate::workflow::{PassSpec, WindowFlow, WindowOutcome};

/// 一次分析的完整输出
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub result: AnalysisResult,
    pub usage: UsageSnapshot,
    pub second_pass: Option<SecondPassReport>,
    pub final_state: AnalysisState,
}

/// 单轮循环统计
#[derive(Debug, Default)]
struct PassRun {
    /// 实际调度过的窗口
    dispatched: usize,
    empty: usize,
    cancelled: bool,
}

/// 分析编排器
pub struct Orchestrator {
    config: Config,
    model: Arc<dyn LanguageModel>,
    similarity: Arc<dyn TextSimilarity>,
}

impl Orchestrator {
    pub fn new(config: Config, model: Arc<dyn LanguageModel>) -> Self {
        Self {
            config,
            model,
            similarity: Arc::new(WordOverlapSimilarity),
        }
    }

    /// 替换相似度实现
    pub fn with_similarity(mut self, similarity: Arc<dyn TextSimilarity>) -> Self {
        self.similarity = similarity;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 从问题集配置文本开始分析；配置不合法时进入 `Failed`
    pub async fn analyze(
        &self,
        session: &AnalysisSession,
        question_config: &str,
        format: QuestionSetFormat,
        pages: Vec<Page>,
    ) -> AppResult<AnalysisReport> {
        match parse_question_set(question_config, format) {
            Ok(question_set) => self.run(session, &question_set, pages).await,
            Err(e) => {
                let mut machine = StateMachine::new(session.events().clone());
                Err(fail(&mut machine, session, e.into()))
            }
        }
    }

    /// 对已加载的问题集和页面执行分析
    pub async fn run(
        &self,
        session: &AnalysisSession,
        question_set: &QuestionSet,
        pages: Vec<Page>,
    ) -> AppResult<AnalysisReport> {
        let started = Instant::now();
        let events = session.events();
        let mut machine = StateMachine::new(events.clone());

        // ========== 加载 ==========
        let windower = match DocumentWindower::new(pages, self.config.window_stride) {
            Ok(windower) => windower,
            Err(e) => return Err(fail(&mut machine, session, e)),
        };
        if windower.is_empty() {
            return Err(fail(
                &mut machine,
                session,
                AppError::OrchestrationFatal("文档没有任何页面".to_string()),
            ));
        }
        if windower.evidence_window_count() == 0 {
            return Err(fail(
                &mut machine,
                session,
                AppError::OrchestrationFatal("所有窗口都没有可用文本".to_string()),
            ));
        }

        let enabled: Vec<&Section> = question_set.enabled_sections().collect();
        if enabled.is_empty() {
            return Err(fail(
                &mut machine,
                session,
                AppError::OrchestrationFatal("没有启用的章节".to_string()),
            ));
        }

        info!(
            "[会话 {}] 📄 {} 个窗口 (有效 {})，{} 个启用章节，{} 个问题",
            session.id(),
            windower.len(),
            windower.evidence_window_count(),
            enabled.len(),
            question_set.enabled_question_count()
        );

        let mut budget = TokenBudgetTracker::new(&self.config);
        let mut accumulator = AnswerAccumulator::new(
            question_set,
            self.similarity.clone(),
            MergeThresholds::from_config(&self.config),
        );
        let call_timeout = Duration::from_secs(self.config.call_timeout_secs);

        // ========== 人设 ==========
        let mut personas = ExpertPersonaCache::new(call_timeout);
        let created = personas
            .prepare(
                &enabled,
                self.model.clone(),
                self.config.max_concurrent_calls,
                &mut budget,
            )
            .await;
        for persona in &created {
            events.emit(ProgressEvent::PersonaCreated {
                section_id: persona.section_id.clone(),
                specialization: persona.specialization.clone(),
                fallback: persona.fallback,
            });
        }
        machine.transition(AnalysisState::PersonasReady)?;

        // ========== 第一轮 ==========
        machine.transition(AnalysisState::WindowLoop)?;

        let assignments: Vec<ExpertAssignment> = enabled
            .iter()
            .filter_map(|section| {
                personas.get(&section.id).map(|persona| ExpertAssignment {
                    persona,
                    questions: section.questions.clone(),
                })
            })
            .collect();

        let dispatcher = MultiExpertDispatcher::new(
            self.model.clone(),
            self.config.max_concurrent_calls,
            call_timeout,
        );
        let flow = WindowFlow::new(&dispatcher, self.config.verbose_logging);
        let mut metrics = RunMetrics {
            windows_total: windower.len(),
            ..RunMetrics::default()
        };

        let first = PassSpec {
            pass: Pass::First,
            assignments: &assignments,
            min_confidence: self.config.first_pass_min_confidence,
            targets: None,
        };
        let first_run = run_pass(
            &flow,
            first,
            windower.as_slice(),
            session,
            &machine,
            &mut accumulator,
            &mut budget,
            &mut metrics,
        )
        .await;
        metrics.windows_empty = first_run.empty;

        complete_pass(session, Pass::First, &accumulator);
        machine.transition(AnalysisState::Accumulated)?;

        // ========== 第二轮 ==========
        let mut cancelled = first_run.cancelled;
        if !cancelled && session.is_cancelled() {
            warn!("[会话 {}] ⏹️ 两轮之间收到取消请求", session.id());
            events.emit(ProgressEvent::Cancelled {
                state: machine.state(),
            });
            cancelled = true;
        }

        let mut second_pass = None;
        if !cancelled && self.config.enable_second_pass {
            if let Some(plan) = SecondPassEnhancer::plan(&accumulator, &personas) {
                machine.transition(AnalysisState::SecondPass)?;
                metrics.second_pass_ran = true;

                let spec = PassSpec {
                    pass: Pass::Second,
                    assignments: plan.assignments(),
                    min_confidence: self.config.second_pass_min_confidence,
                    targets: Some(&plan),
                };
                let second_run = run_pass(
                    &flow,
                    spec,
                    windower.as_slice(),
                    session,
                    &machine,
                    &mut accumulator,
                    &mut budget,
                    &mut metrics,
                )
                .await;
                cancelled = second_run.cancelled;

                let report = plan.report(&accumulator, second_run.dispatched, second_run.cancelled);
                info!(
                    "[会话 {}] 🔁 第二轮完成: 目标 {} 题，新回答 {} 题",
                    session.id(),
                    report.targeted.len(),
                    report.newly_answered.len()
                );
                complete_pass(session, Pass::Second, &accumulator);
                second_pass = Some(report);
            } else {
                info!("[会话 {}] ✓ 第一轮已回答全部问题，跳过第二轮", session.id());
            }
        }

        // ========== 编译 ==========
        machine.transition(AnalysisState::Compiled)?;
        let usage = budget.report();
        metrics.cancelled = cancelled;
        metrics.elapsed = started.elapsed();
        let result = compile(question_set, &accumulator, &usage, metrics);

        machine.transition(AnalysisState::Done)?;
        events.emit(ProgressEvent::Completed {
            coverage_pct: result.statistics.coverage_pct,
            answered: result.statistics.answered,
            total_questions: result.statistics.total_questions,
        });

        Ok(AnalysisReport {
            result,
            usage,
            second_pass,
            final_state: machine.state(),
        })
    }
}

/// 按顺序处理所有窗口；每个窗口开始前检查取消
#[allow(clippy::too_many_arguments)]
async fn run_pass(
    flow: &WindowFlow<'_>,
    spec: PassSpec<'_>,
    windows: &[DocumentWindow],
    session: &AnalysisSession,
    machine: &StateMachine,
    accumulator: &mut AnswerAccumulator,
    budget: &mut TokenBudgetTracker,
    metrics: &mut RunMetrics,
) -> PassRun {
    let mut run = PassRun::default();

    for window in windows {
        if session.is_cancelled() {
            warn!(
                "[会话 {}] ⏹️ {} 在窗口 {}/{} 前取消",
                session.id(),
                spec.pass,
                window.index + 1,
                window.total_windows
            );
            session.events().emit(ProgressEvent::Cancelled {
                state: machine.state(),
            });
            run.cancelled = true;
            break;
        }

        match flow
            .run(window, spec, accumulator, budget, session.events())
            .await
        {
            WindowOutcome::Empty => run.empty += 1,
            WindowOutcome::Processed(summary) => {
                run.dispatched += 1;
                metrics.expert_calls += summary.succeeded + summary.failed;
                metrics.failed_calls += summary.failed;
            }
        }
    }

    run
}

fn complete_pass(session: &AnalysisSession, pass: Pass, accumulator: &AnswerAccumulator) {
    let answered = accumulator.answered_count();
    let unanswered = accumulator.enabled_question_count() - answered;
    info!(
        "[会话 {}] ✓ {}结束: 已回答 {}，未回答 {}",
        session.id(),
        pass,
        answered,
        unanswered
    );
    session.events().emit(ProgressEvent::PassComplete {
        pass,
        answered,
        unanswered,
    });
}

/// 进入 `Failed` 并返回致命错误
fn fail(machine: &mut StateMachine, session: &AnalysisSession, err: AppError) -> AppError {
    error!("[会话 {}] ❌ 分析失败: {}", session.id(), err);
    session.events().emit(ProgressEvent::Error {
        message: err.to_string(),
        fatal: true,
    });
    if let Err(e) = machine.transition(AnalysisState::Failed) {
        error!("[会话 {}] {}", session.id(), e);
    }
    err
}
