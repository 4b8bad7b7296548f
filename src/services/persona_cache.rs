//! 专家人设缓存 - 业务能力层
//!
//! 每个启用的章节对应一个专家人设，首次用到时调用一次模型生成，
//! 之后整个运行期间（两轮）都复用，不再重新生成。
//! 生成失败时使用通用模板，不影响后续流程。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::infrastructure::llm_client::LanguageModel;
use crate::models::question::Section;
use crate::services::prompts::{generic_persona_prompt, parse_persona_response, persona_request};
use crate::services::token_budget::TokenBudgetTracker;

/// 某个章节的专家人设
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpertPersona {
    pub section_id: String,
    pub section_name: String,
    pub system_prompt: String,
    pub specialization: String,
    /// 是否为通用模板
    pub fallback: bool,
}

impl ExpertPersona {
    /// 通用模板人设
    pub fn generic(section: &Section) -> Self {
        Self {
            section_id: section.id.clone(),
            section_name: section.name.clone(),
            system_prompt: generic_persona_prompt(section),
            specialization: section.name.clone(),
            fallback: true,
        }
    }
}

/// 一次生成的结果与用量
struct Generated {
    persona: ExpertPersona,
    usage: Option<(usize, usize)>,
}

/// 专家人设缓存，只由编排层持有
pub struct ExpertPersonaCache {
    personas: HashMap<String, Arc<ExpertPersona>>,
    call_timeout: Duration,
}

impl ExpertPersonaCache {
    pub fn new(call_timeout: Duration) -> Self {
        Self {
            personas: HashMap::new(),
            call_timeout,
        }
    }

    pub fn get(&self, section_id: &str) -> Option<Arc<ExpertPersona>> {
        self.personas.get(section_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }

    /// 取缓存人设，不存在则生成；返回 (人设, 是否新建)
    pub async fn get_or_create(
        &mut self,
        section: &Section,
        model: &dyn LanguageModel,
        budget: &mut TokenBudgetTracker,
    ) -> (Arc<ExpertPersona>, bool) {
        if let Some(persona) = self.get(&section.id) {
            return (persona, false);
        }

        let generated = generate(section, model, self.call_timeout).await;
        (self.insert(generated, budget), true)
    }

    /// 为所有尚未缓存的章节并发生成人设，并发数与专家调度一致。
    ///
    /// 返回新建的人设，顺序与 `sections` 一致。
    pub async fn prepare(
        &mut self,
        sections: &[&Section],
        model: Arc<dyn LanguageModel>,
        max_concurrent: usize,
        budget: &mut TokenBudgetTracker,
    ) -> Vec<Arc<ExpertPersona>> {
        let missing: Vec<&Section> = sections
            .iter()
            .copied()
            .filter(|s| !self.personas.contains_key(&s.id))
            .collect();

        if missing.is_empty() {
            return Vec::new();
        }
        info!("🧑‍🔬 正在为 {} 个章节生成专家人设...", missing.len());

        let timeout = self.call_timeout;
        let mut generated: HashMap<String, Generated> = stream::iter(missing.iter().copied())
            .map(|section| {
                let model = model.clone();
                async move {
                    let g = generate(section, model.as_ref(), timeout).await;
                    (section.id.clone(), g)
                }
            })
            .buffer_unordered(max_concurrent.max(1))
            .collect()
            .await;

        // 按章节顺序写入，保证事件顺序稳定
        missing
            .iter()
            .filter_map(|section| generated.remove(&section.id))
            .map(|g| self.insert(g, budget))
            .collect()
    }

    fn insert(&mut self, generated: Generated, budget: &mut TokenBudgetTracker) -> Arc<ExpertPersona> {
        if let Some((prompt, completion)) = generated.usage {
            budget.record(prompt, completion);
        }
        let persona = Arc::new(generated.persona);
        self.personas
            .insert(persona.section_id.clone(), persona.clone());
        persona
    }
}

async fn generate(section: &Section, model: &dyn LanguageModel, timeout: Duration) -> Generated {
    let (system, user) = persona_request(section);

    let response = match tokio::time::timeout(timeout, model.call(&system, &user)).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            warn!("[章节 {}] ⚠️ 人设生成失败，使用通用模板: {}", section.id, e);
            return Generated {
                persona: ExpertPersona::generic(section),
                usage: None,
            };
        }
        Err(_) => {
            warn!(
                "[章节 {}] ⚠️ 人设生成超时 ({}s)，使用通用模板",
                section.id,
                timeout.as_secs()
            );
            return Generated {
                persona: ExpertPersona::generic(section),
                usage: None,
            };
        }
    };

    let usage = Some((response.prompt_tokens, response.completion_tokens));
    let persona = match parse_persona_response(section, &response.content) {
        Some((specialization, system_prompt)) => {
            debug!("[章节 {}] 人设: {}", section.id, specialization);
            ExpertPersona {
                section_id: section.id.clone(),
                section_name: section.name.clone(),
                system_prompt,
                specialization,
                fallback: false,
            }
        }
        None => {
            warn!("[章节 {}] ⚠️ 人设内容为空，使用通用模板", section.id);
            ExpertPersona::generic(section)
        }
    };

    Generated { persona, usage }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::ModelCallError;
    use crate::models::question::fixtures::question_set;
    use crate::test_support::ScriptedModel;

    fn persona_json(user: &str) -> Result<String, ModelCallError> {
        let name = user.split('"').nth(1).unwrap_or("unknown");
        Ok(format!(
            r#"{{"specialization":"{} specialist","system_prompt":"You review {}."}}"#,
            name, name
        ))
    }

    #[tokio::test]
    async fn test_persona_created_once_and_reused() {
        let set = question_set(&[("materials", true, 2)]);
        let model = ScriptedModel::new(|_, user| persona_json(user));
        let mut budget = TokenBudgetTracker::new(&Config::default());
        let mut cache = ExpertPersonaCache::new(Duration::from_secs(5));

        let (first, created) = cache.get_or_create(&set.sections[0], &model, &mut budget).await;
        assert!(created);
        assert!(!first.fallback);
        assert_eq!(first.specialization, "materials section specialist");

        let (second, created) = cache.get_or_create(&set.sections[0], &model, &mut budget).await;
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(model.calls(), 1);
        assert_eq!(budget.report().calls, 1);
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_generic_template() {
        let set = question_set(&[("curing", true, 1)]);
        let model = ScriptedModel::new(|_, _| {
            Err(ModelCallError::Request {
                model: "scripted".to_string(),
                message: "503".to_string(),
            })
        });
        let mut budget = TokenBudgetTracker::new(&Config::default());
        let mut cache = ExpertPersonaCache::new(Duration::from_secs(5));

        let (persona, created) = cache.get_or_create(&set.sections[0], &model, &mut budget).await;
        assert!(created);
        assert!(persona.fallback);
        assert!(persona.system_prompt.contains("curing section"));
        assert_eq!(budget.report().calls, 0);
    }

    #[tokio::test]
    async fn test_prepare_warms_every_section_in_order() {
        let set = question_set(&[("a", true, 1), ("b", true, 1), ("c", true, 1)]);
        let sections: Vec<&Section> = set.enabled_sections().collect();
        let model: Arc<ScriptedModel> = Arc::new(ScriptedModel::new(|_, user| persona_json(user)));
        let mut budget = TokenBudgetTracker::new(&Config::default());
        let mut cache = ExpertPersonaCache::new(Duration::from_secs(5));

        let created = cache.prepare(&sections, model.clone(), 2, &mut budget).await;
        let ids: Vec<&str> = created.iter().map(|p| p.section_id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(cache.len(), 3);

        // 第二次不再调用模型
        let again = cache.prepare(&sections, model.clone(), 2, &mut budget).await;
        assert!(again.is_empty());
        assert_eq!(model.calls(), 3);
    }
}
