//! 多专家调度 - 业务能力层
//!
//! 对一个窗口，每个启用的章节（专家）各发起一次模型调用：
//! - 提示词在编排层所在任务中构建并适配 token 预算
//! - 调用通过 `Semaphore` 限制同时在途的数量，超出的排队等待
//! - 每次调用都有超时；超时、网络错误、无法解析的返回只影响该专家
//! - 子任务只返回值，用量由调用方统一记录

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::{AppError, ModelCallError};
use crate::infrastructure::llm_client::LanguageModel;
use crate::models::answer::{Pass, RawAnswer};
use crate::models::document::DocumentWindow;
use crate::models::question::Question;
use crate::services::citation::{check_citations, CitationCheck};
use crate::services::persona_cache::ExpertPersona;
use crate::services::prompts::{parse_expert_response, user_prompt_frame, ModelAnswer};
use crate::services::token_budget::{estimate_tokens, TokenBudgetTracker};

/// 一个专家在一个窗口上的任务
#[derive(Debug, Clone)]
pub struct ExpertAssignment {
    pub persona: Arc<ExpertPersona>,
    pub questions: Vec<Question>,
}

impl ExpertAssignment {
    pub fn section_id(&self) -> &str {
        &self.persona.section_id
    }
}

/// 单个专家的调用结果
#[derive(Debug, Clone, PartialEq)]
pub struct ExpertOutcome {
    pub section_id: String,
    pub answers: usize,
    /// 校验时丢弃的答案数
    pub dropped: usize,
    pub truncated: bool,
    pub error: Option<ModelCallError>,
}

impl ExpertOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// 一个窗口的调度结果
#[derive(Debug, Clone, Default)]
pub struct WindowDispatch {
    pub answers: Vec<RawAnswer>,
    pub outcomes: Vec<ExpertOutcome>,
}

impl WindowDispatch {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// 子任务返回值
struct CallResult {
    usage: Option<(usize, usize)>,
    answers: Result<(Vec<RawAnswer>, usize), ModelCallError>,
}

/// 多专家调度器
pub struct MultiExpertDispatcher {
    model: Arc<dyn LanguageModel>,
    semaphore: Arc<Semaphore>,
    call_timeout: Duration,
}

impl MultiExpertDispatcher {
    pub fn new(model: Arc<dyn LanguageModel>, max_concurrent: usize, call_timeout: Duration) -> Self {
        Self {
            model,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            call_timeout,
        }
    }

    /// 对一个窗口并发调用所有专家，等待全部完成后返回
    pub async fn dispatch(
        &self,
        window: &DocumentWindow,
        assignments: &[ExpertAssignment],
        pass: Pass,
        min_confidence: f64,
        budget: &mut TokenBudgetTracker,
    ) -> WindowDispatch {
        let mut result = WindowDispatch::default();
        let mut handles = Vec::new();
        let shared_window = Arc::new(window.clone());

        for assignment in assignments.iter().filter(|a| !a.questions.is_empty()) {
            let section_id = assignment.section_id().to_string();

            // 构建提示词并适配预算
            let (prefix, suffix) = user_prompt_frame(window, &assignment.questions, pass);
            let fixed_tokens = estimate_tokens(&assignment.persona.system_prompt)
                + estimate_tokens(&prefix)
                + estimate_tokens(&suffix);

            let fitted = match budget.fit_window(&window.text, fixed_tokens) {
                Ok(fitted) => fitted,
                Err(e) => {
                    let outcome = skipped_outcome(section_id, e);
                    if let Some(err) = &outcome.error {
                        warn!("[章节 {}] ⚠️ 跳过本窗口: {}", outcome.section_id, err);
                    }
                    result.outcomes.push(outcome);
                    continue;
                }
            };

            let user_prompt = format!("{}{}{}", prefix, fitted.text, suffix);
            let system_prompt = assignment.persona.system_prompt.clone();
            let question_ids: HashSet<String> =
                assignment.questions.iter().map(|q| q.id.clone()).collect();

            let model = self.model.clone();
            let semaphore = self.semaphore.clone();
            let call_timeout = self.call_timeout;
            let task_window = shared_window.clone();
            let task_section = section_id.clone();

            let handle = tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        return CallResult {
                            usage: None,
                            answers: Err(ModelCallError::TaskFailed {
                                expert: task_section,
                                message: e.to_string(),
                            }),
                        }
                    }
                };

                call_expert(
                    model.as_ref(),
                    &system_prompt,
                    &user_prompt,
                    call_timeout,
                    &task_window,
                    &task_section,
                    &question_ids,
                    pass,
                    min_confidence,
                )
                .await
            });
            handles.push((section_id, fitted.truncated, handle));
        }

        // 等待本窗口所有专家完成
        for (section_id, truncated, handle) in handles {
            let call = match handle.await {
                Ok(call) => call,
                Err(e) => CallResult {
                    usage: None,
                    answers: Err(ModelCallError::TaskFailed {
                        expert: section_id.clone(),
                        message: e.to_string(),
                    }),
                },
            };

            if let Some((prompt, completion)) = call.usage {
                budget.record(prompt, completion);
            }

            match call.answers {
                Ok((answers, dropped)) => {
                    debug!(
                        "[章节 {}] 窗口 {} 返回 {} 条有效答案 (丢弃 {})",
                        section_id,
                        window.index + 1,
                        answers.len(),
                        dropped
                    );
                    result.outcomes.push(ExpertOutcome {
                        section_id,
                        answers: answers.len(),
                        dropped,
                        truncated,
                        error: None,
                    });
                    result.answers.extend(answers);
                }
                Err(e) => {
                    warn!("[章节 {}] ❌ 窗口 {} 调用失败: {}", section_id, window.index + 1, e);
                    result.outcomes.push(ExpertOutcome {
                        section_id,
                        answers: 0,
                        dropped: 0,
                        truncated,
                        error: Some(e),
                    });
                }
            }
        }

        result
    }
}

#[allow(clippy::too_many_arguments)]
async fn call_expert(
    model: &dyn LanguageModel,
    system_prompt: &str,
    user_prompt: &str,
    call_timeout: Duration,
    window: &DocumentWindow,
    section_id: &str,
    question_ids: &HashSet<String>,
    pass: Pass,
    min_confidence: f64,
) -> CallResult {
    let response = match tokio::time::timeout(call_timeout, model.call(system_prompt, user_prompt)).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            return CallResult {
                usage: None,
                answers: Err(e),
            }
        }
        Err(_) => {
            return CallResult {
                usage: None,
                answers: Err(ModelCallError::Timeout {
                    expert: section_id.to_string(),
                    timeout_secs: call_timeout.as_secs(),
                }),
            }
        }
    };

    let usage = Some((response.prompt_tokens, response.completion_tokens));
    let answers = parse_expert_response(&response.content)
        .map_err(|message| ModelCallError::MalformedResponse {
            expert: section_id.to_string(),
            message,
        })
        .map(|parsed| validate_answers(parsed, window, section_id, question_ids, pass, min_confidence));

    CallResult { usage, answers }
}

/// 提示词无法构建时的专家结果，计入失败调用
fn skipped_outcome(section_id: String, err: AppError) -> ExpertOutcome {
    let error = match err {
        AppError::BudgetExceeded { fixed_tokens, ceiling } => ModelCallError::OverBudget {
            expert: section_id.clone(),
            fixed_tokens,
            ceiling,
        },
        other => ModelCallError::TaskFailed {
            expert: section_id.clone(),
            message: other.to_string(),
        },
    };
    ExpertOutcome {
        section_id,
        answers: 0,
        dropped: 0,
        truncated: false,
        error: Some(error),
    }
}

/// 把模型答案校验为原始答案，返回 (有效答案, 丢弃数)
pub fn validate_answers(
    parsed: Vec<ModelAnswer>,
    window: &DocumentWindow,
    section_id: &str,
    question_ids: &HashSet<String>,
    pass: Pass,
    min_confidence: f64,
) -> (Vec<RawAnswer>, usize) {
    let mut accepted = Vec::new();
    let mut dropped = 0;

    for answer in parsed {
        if !question_ids.contains(&answer.question_id) {
            debug!("[章节 {}] 丢弃未知问题 id: {}", section_id, answer.question_id);
            dropped += 1;
            continue;
        }
        if answer.confidence < min_confidence {
            debug!(
                "[章节 {}] 问题 {} 置信度 {:.2} 低于 {:.2}，丢弃",
                section_id, answer.question_id, answer.confidence, min_confidence
            );
            dropped += 1;
            continue;
        }

        let citations = match check_citations(&answer.pages, &answer.text, window) {
            CitationCheck::Valid(pages) => pages,
            CitationCheck::Repaired(pages) => {
                debug!(
                    "[章节 {}] 问题 {} 引用已从答案文本修复: {:?}",
                    section_id, answer.question_id, pages
                );
                pages
            }
            CitationCheck::Missing => {
                warn!(
                    "[章节 {}] ⚠️ 问题 {} 的答案没有有效页码引用 (窗口页码 {})，丢弃",
                    section_id,
                    answer.question_id,
                    window.page_label()
                );
                dropped += 1;
                continue;
            }
        };

        accepted.push(RawAnswer {
            question_id: answer.question_id,
            section_id: section_id.to_string(),
            text: answer.text,
            citations,
            confidence: answer.confidence.clamp(0.0, 1.0),
            reasoning: answer.reasoning,
            window_index: window.index,
            pass,
        });
    }

    (accepted, dropped)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::config::Config;
    use crate::models::question::fixtures::question_set;
    use crate::test_support::ScriptedModel;

    fn window() -> DocumentWindow {
        DocumentWindow {
            index: 1,
            pages: vec![4, 5, 6],
            text: "[Page 4]\nResin: vinyl ester\n\n[Page 5]\nCure: steam\n\n[Page 6]\nThickness 6 mm".to_string(),
            total_windows: 3,
            has_evidence: true,
        }
    }

    fn persona(section_id: &str) -> Arc<ExpertPersona> {
        Arc::new(ExpertPersona {
            section_id: section_id.to_string(),
            section_name: section_id.to_string(),
            system_prompt: format!("You are the {} expert.", section_id),
            specialization: section_id.to_string(),
            fallback: false,
        })
    }

    fn model_answer(id: &str, text: &str, pages: &[u32], confidence: f64) -> ModelAnswer {
        ModelAnswer {
            question_id: id.to_string(),
            text: text.to_string(),
            pages: pages.iter().copied().collect(),
            confidence,
            reasoning: None,
        }
    }

    #[test]
    fn test_validate_answers() {
        let ids: HashSet<String> = ["m1", "m2", "m3", "m4"].iter().map(|s| s.to_string()).collect();
        let parsed = vec![
            model_answer("m1", "Vinyl ester", &[4], 0.9),
            model_answer("m2", "Steam cure (page 5)", &[40], 0.7),
            model_answer("m3", "6 mm", &[], 0.8),
            model_answer("m4", "maybe", &[6], 0.1),
            model_answer("zz", "unrelated", &[4], 0.9),
        ];

        let (accepted, dropped) = validate_answers(parsed, &window(), "materials", &ids, Pass::First, 0.3);

        assert_eq!(dropped, 3);
        assert_eq!(accepted.len(), 2);
        assert_eq!(accepted[0].citations, BTreeSet::from([4]));
        assert_eq!(accepted[1].question_id, "m2");
        assert_eq!(accepted[1].citations, BTreeSet::from([5]));
        assert!(accepted.iter().all(|a| a.window_index == 1 && a.section_id == "materials"));
    }

    #[tokio::test]
    async fn test_dispatch_one_call_per_expert() {
        let set = question_set(&[("a", true, 2), ("b", true, 1)]);
        let model = Arc::new(ScriptedModel::new(|system, _| {
            if system.contains("the a expert") {
                Ok(r#"{"answers":[{"question_id":"a-q1","answer":"Vinyl ester","pages":[4],"confidence":0.9}]}"#.to_string())
            } else {
                Ok(r#"{"answers":[]}"#.to_string())
            }
        }));
        let dispatcher = MultiExpertDispatcher::new(model.clone(), 5, Duration::from_secs(5));
        let assignments: Vec<ExpertAssignment> = set
            .sections
            .iter()
            .map(|s| ExpertAssignment {
                persona: persona(&s.id),
                questions: s.questions.clone(),
            })
            .collect();
        let mut budget = TokenBudgetTracker::new(&Config::default());

        let result = dispatcher
            .dispatch(&window(), &assignments, Pass::First, 0.3, &mut budget)
            .await;

        assert_eq!(model.calls(), 2);
        assert_eq!(result.succeeded(), 2);
        assert_eq!(result.answers.len(), 1);
        assert_eq!(result.answers[0].question_id, "a-q1");
        assert_eq!(budget.report().calls, 2);
    }

    #[tokio::test]
    async fn test_malformed_response_only_affects_one_expert() {
        let set = question_set(&[("a", true, 1), ("b", true, 1)]);
        let model = Arc::new(ScriptedModel::new(|system, _| {
            if system.contains("the a expert") {
                Ok("Sorry, I cannot help with that.".to_string())
            } else {
                Ok(r#"[{"question_id":"b-q1","answer":"Steam","pages":[5],"confidence":0.6}]"#.to_string())
            }
        }));
        let dispatcher = MultiExpertDispatcher::new(model, 5, Duration::from_secs(5));
        let assignments: Vec<ExpertAssignment> = set
            .sections
            .iter()
            .map(|s| ExpertAssignment {
                persona: persona(&s.id),
                questions: s.questions.clone(),
            })
            .collect();
        let mut budget = TokenBudgetTracker::new(&Config::default());

        let result = dispatcher
            .dispatch(&window(), &assignments, Pass::First, 0.3, &mut budget)
            .await;

        assert_eq!(result.failed(), 1);
        assert!(matches!(
            result.outcomes[0].error,
            Some(ModelCallError::MalformedResponse { .. })
        ));
        assert_eq!(result.answers.len(), 1);
        assert_eq!(result.answers[0].question_id, "b-q1");
    }

    #[tokio::test]
    async fn test_semaphore_bounds_in_flight_calls() {
        let ids: Vec<String> = (0..8).map(|i| format!("s{}", i)).collect();
        let spec: Vec<(&str, bool, usize)> = ids.iter().map(|id| (id.as_str(), true, 1)).collect();
        let set = question_set(&spec);
        let model = Arc::new(
            ScriptedModel::new(|_, _| Ok("[]".to_string())).with_delay(Duration::from_millis(20)),
        );
        let dispatcher = MultiExpertDispatcher::new(model.clone(), 3, Duration::from_secs(5));
        let assignments: Vec<ExpertAssignment> = set
            .sections
            .iter()
            .map(|s| ExpertAssignment {
                persona: persona(&s.id),
                questions: s.questions.clone(),
            })
            .collect();
        let mut budget = TokenBudgetTracker::new(&Config::default());

        let result = dispatcher
            .dispatch(&window(), &assignments, Pass::First, 0.3, &mut budget)
            .await;

        assert_eq!(model.calls(), 8);
        assert_eq!(result.succeeded(), 8);
        assert!(model.max_in_flight() <= 3);
    }

    #[tokio::test]
    async fn test_over_budget_expert_is_skipped() {
        let set = question_set(&[("a", true, 1)]);
        let model = Arc::new(ScriptedModel::new(|_, _| Ok("[]".to_string())));
        let dispatcher = MultiExpertDispatcher::new(model.clone(), 5, Duration::from_secs(5));
        let assignments = vec![ExpertAssignment {
            persona: persona("a"),
            questions: set.sections[0].questions.clone(),
        }];
        let mut budget = TokenBudgetTracker::new(&Config {
            max_prompt_tokens: 10,
            ..Config::default()
        });

        let result = dispatcher
            .dispatch(&window(), &assignments, Pass::First, 0.3, &mut budget)
            .await;

        assert_eq!(model.calls(), 0);
        assert!(matches!(
            result.outcomes[0].error,
            Some(ModelCallError::OverBudget { ceiling: 10, .. })
        ));
    }

    #[test]
    fn test_unbuildable_prompt_counts_as_failed_call() {
        let budget = skipped_outcome(
            "a".to_string(),
            AppError::BudgetExceeded { fixed_tokens: 12, ceiling: 10 },
        );
        assert!(matches!(budget.error, Some(ModelCallError::OverBudget { fixed_tokens: 12, .. })));

        let other = skipped_outcome(
            "b".to_string(),
            AppError::OrchestrationFatal("prompt frame".to_string()),
        );
        assert_eq!(other.section_id, "b");
        assert!(matches!(other.error, Some(ModelCallError::TaskFailed { ref expert, .. }) if expert == "b"));

        let dispatch = WindowDispatch {
            answers: Vec::new(),
            outcomes: vec![budget, other],
        };
        assert_eq!(dispatch.failed(), 2);
        assert_eq!(dispatch.succeeded(), 0);
    }
}
