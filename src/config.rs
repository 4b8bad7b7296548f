use crate::error::ConfigError;

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 单个窗口内同时在途的模型调用数量
    pub max_concurrent_calls: usize,
    /// 每个窗口包含的页数
    pub window_stride: usize,
    /// 单次调用的提示词 token 上限（需低于模型上下文长度）
    pub max_prompt_tokens: usize,
    /// 单次调用的最大生成 token 数
    pub max_completion_tokens: u32,
    /// 单次调用的超时时间（秒）
    pub call_timeout_secs: u64,
    /// 第一轮合并相似度阈值
    pub first_pass_similarity: f64,
    /// 第二轮合并相似度阈值
    pub second_pass_similarity: f64,
    /// 第一轮最低置信度
    pub first_pass_min_confidence: f64,
    /// 第二轮最低置信度
    pub second_pass_min_confidence: f64,
    /// 截断时保留的头部比例，其余保留尾部
    pub truncation_head_ratio: f64,
    /// 是否对未回答的问题执行第二轮
    pub enable_second_pass: bool,
    /// 每 1000 个提示词 token 的价格（美元）
    pub prompt_cost_per_1k: f64,
    /// 每 1000 个生成 token 的价格（美元）
    pub completion_cost_per_1k: f64,
    /// 问题集配置文件（TOML 或 JSON）
    pub question_set_path: String,
    /// 带页码标记的文档文本
    pub document_path: String,
    /// 结果输出文件
    pub output_path: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    pub llm_temperature: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_calls: 5,
            window_stride: 3,
            max_prompt_tokens: 12_000,
            max_completion_tokens: 2048,
            call_timeout_secs: 120,
            first_pass_similarity: 0.75,
            second_pass_similarity: 0.3,
            first_pass_min_confidence: 0.3,
            second_pass_min_confidence: 0.1,
            truncation_head_ratio: 0.6,
            enable_second_pass: true,
            prompt_cost_per_1k: 0.00015,
            completion_cost_per_1k: 0.0006,
            question_set_path: "questions.toml".to_string(),
            document_path: "document.txt".to_string(),
            output_path: "analysis_result.json".to_string(),
            verbose_logging: false,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
            llm_temperature: 0.2,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_concurrent_calls: env_parse("MAX_CONCURRENT_CALLS").unwrap_or(default.max_concurrent_calls),
            window_stride: env_parse("WINDOW_STRIDE").unwrap_or(default.window_stride),
            max_prompt_tokens: env_parse("MAX_PROMPT_TOKENS").unwrap_or(default.max_prompt_tokens),
            max_completion_tokens: env_parse("MAX_COMPLETION_TOKENS").unwrap_or(default.max_completion_tokens),
            call_timeout_secs: env_parse("CALL_TIMEOUT_SECS").unwrap_or(default.call_timeout_secs),
            first_pass_similarity: env_parse("FIRST_PASS_SIMILARITY").unwrap_or(default.first_pass_similarity),
            second_pass_similarity: env_parse("SECOND_PASS_SIMILARITY").unwrap_or(default.second_pass_similarity),
            first_pass_min_confidence: env_parse("FIRST_PASS_MIN_CONFIDENCE").unwrap_or(default.first_pass_min_confidence),
            second_pass_min_confidence: env_parse("SECOND_PASS_MIN_CONFIDENCE").unwrap_or(default.second_pass_min_confidence),
            truncation_head_ratio: env_parse("TRUNCATION_HEAD_RATIO").unwrap_or(default.truncation_head_ratio),
            enable_second_pass: env_parse("ENABLE_SECOND_PASS").unwrap_or(default.enable_second_pass),
            prompt_cost_per_1k: env_parse("PROMPT_COST_PER_1K").unwrap_or(default.prompt_cost_per_1k),
            completion_cost_per_1k: env_parse("COMPLETION_COST_PER_1K").unwrap_or(default.completion_cost_per_1k),
            question_set_path: std::env::var("QUESTION_SET_PATH").unwrap_or(default.question_set_path),
            document_path: std::env::var("DOCUMENT_PATH").unwrap_or(default.document_path),
            output_path: std::env::var("OUTPUT_PATH").unwrap_or(default.output_path),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(default.verbose_logging),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            llm_temperature: env_parse("LLM_TEMPERATURE").unwrap_or(default.llm_temperature),
        }
    }

    /// 校验取值范围，任何一项不合法都拒绝启动
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_calls == 0 {
            return Err(ConfigError::OutOfRange {
                field: "max_concurrent_calls",
                value: self.max_concurrent_calls.to_string(),
                expected: "至少为 1",
            });
        }
        if self.window_stride == 0 {
            return Err(ConfigError::OutOfRange {
                field: "window_stride",
                value: self.window_stride.to_string(),
                expected: "至少为 1",
            });
        }
        if self.max_prompt_tokens == 0 {
            return Err(ConfigError::OutOfRange {
                field: "max_prompt_tokens",
                value: self.max_prompt_tokens.to_string(),
                expected: "至少为 1",
            });
        }
        if self.call_timeout_secs == 0 {
            return Err(ConfigError::OutOfRange {
                field: "call_timeout_secs",
                value: self.call_timeout_secs.to_string(),
                expected: "至少为 1",
            });
        }

        let unit_fields = [
            ("first_pass_similarity", self.first_pass_similarity),
            ("second_pass_similarity", self.second_pass_similarity),
            ("first_pass_min_confidence", self.first_pass_min_confidence),
            ("second_pass_min_confidence", self.second_pass_min_confidence),
        ];
        for (field, value) in unit_fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfRange {
                    field,
                    value: value.to_string(),
                    expected: "位于 [0, 1]",
                });
            }
        }

        if !(self.truncation_head_ratio > 0.0 && self.truncation_head_ratio < 1.0) {
            return Err(ConfigError::OutOfRange {
                field: "truncation_head_ratio",
                value: self.truncation_head_ratio.to_string(),
                expected: "位于 (0, 1)",
            });
        }

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(var_name: &str) -> Option<T> {
    std::env::var(var_name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_concurrent_calls, 5);
        assert_eq!(config.window_stride, 3);
        assert_eq!(config.first_pass_similarity, 0.75);
        assert_eq!(config.second_pass_similarity, 0.3);
        assert_eq!(config.truncation_head_ratio, 0.6);
    }

    #[test]
    fn test_validate_rejects_zero_stride() {
        let config = Config {
            window_stride: 0,
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("window_stride"));
    }

    #[test]
    fn test_validate_rejects_threshold_out_of_range() {
        let config = Config {
            second_pass_similarity: 1.5,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            truncation_head_ratio: 1.0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
