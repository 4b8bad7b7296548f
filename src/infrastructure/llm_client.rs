//! LLM 客户端 - 基础设施层
//!
//! 只暴露"调用一次模型"的能力，不认识问题、窗口或章节
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao 等）

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::ModelCallError;

/// 一次调用的原始返回
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelResponse {
    pub content: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// 语言模型调用能力
///
/// 调用可能失败（网络、限流、空响应），调用方负责把失败降级为"该专家本窗口无答案"。
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// 模型名，用于日志和错误信息
    fn name(&self) -> &str;

    async fn call(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<ModelResponse, ModelCallError>;
}

/// 基于 async-openai 的模型实现
pub struct OpenAiModel {
    client: Client<OpenAIConfig>,
    model_name: String,
    temperature: f32,
    max_completion_tokens: u32,
}

impl OpenAiModel {
    /// 创建新的模型客户端
    pub fn new(config: &Config) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
            temperature: config.llm_temperature,
            max_completion_tokens: config.max_completion_tokens,
        }
    }

    fn request_error(&self, e: impl std::fmt::Display) -> ModelCallError {
        ModelCallError::Request {
            model: self.model_name.clone(),
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAiModel {
    fn name(&self) -> &str {
        &self.model_name
    }

    async fn call(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<ModelResponse, ModelCallError> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        debug!("用户消息长度: {} 字符", user_prompt.len());

        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(system_prompt)
            .build()
            .map_err(|e| self.request_error(e))?;
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_prompt)
            .build()
            .map_err(|e| self.request_error(e))?;

        let messages = vec![
            ChatCompletionRequestMessage::System(system_msg),
            ChatCompletionRequestMessage::User(user_msg),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(self.temperature)
            .max_tokens(self.max_completion_tokens)
            .build()
            .map_err(|e| self.request_error(e))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            self.request_error(e)
        })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ModelCallError::EmptyContent {
                model: self.model_name.clone(),
            })?;

        // 服务端未返回 usage 时按字符估算
        let (prompt_tokens, completion_tokens) = match &response.usage {
            Some(usage) => (usage.prompt_tokens as usize, usage.completion_tokens as usize),
            None => (
                crate::services::token_budget::estimate_tokens(system_prompt)
                    + crate::services::token_budget::estimate_tokens(user_prompt),
                crate::services::token_budget::estimate_tokens(&content),
            ),
        };

        Ok(ModelResponse {
            content: content.trim().to_string(),
            prompt_tokens,
            completion_tokens,
        })
    }
}
