//! 单元测试用的脚本化模型

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ModelCallError;
use crate::infrastructure::llm_client::{LanguageModel, ModelResponse};
use crate::services::token_budget::estimate_tokens;

type Handler = dyn Fn(&str, &str) -> Result<String, ModelCallError> + Send + Sync;

/// 按 (system, user) 返回预设内容，并记录调用次数与最大并发
pub(crate) struct ScriptedModel {
    handler: Box<Handler>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedModel {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, &str) -> Result<String, ModelCallError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn call(&self, system_prompt: &str, user_prompt: &str) -> Result<ModelResponse, ModelCallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let content = (self.handler)(system_prompt, user_prompt)?;
        Ok(ModelResponse {
            prompt_tokens: estimate_tokens(system_prompt) + estimate_tokens(user_prompt),
            completion_tokens: estimate_tokens(&content),
            content,
        })
    }
}

/// 人设生成请求的判定
pub(crate) fn is_persona_request(system_prompt: &str) -> bool {
    system_prompt.starts_with("You design expert reviewer personas")
}
