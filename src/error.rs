use thiserror::Error;

/// 应用程序错误类型
///
/// 只有 `Validation` 与 `OrchestrationFatal` 会终止一次分析，
/// 其余错误在局部吸收，只体现为覆盖率下降。
#[derive(Debug, Error)]
pub enum AppError {
    /// 问题集配置不合法（致命）
    #[error("问题集校验失败: {0}")]
    Validation(#[from] ValidationError),

    /// 窗口没有可用文本（非致命）
    #[error("窗口 {window_index} 没有可用文本 (页码: {pages:?})")]
    ExtractionEmpty { window_index: usize, pages: Vec<u32> },

    /// 单个专家调用失败（非致命）
    #[error(transparent)]
    ModelCall(#[from] ModelCallError),

    /// 提示词超出 token 上限且无法通过截断恢复
    #[error("提示词超出 token 上限: 固定部分 {fixed_tokens} > 上限 {ceiling}")]
    BudgetExceeded { fixed_tokens: usize, ceiling: usize },

    /// 没有任何窗口或启用的章节（致命）
    #[error("分析无法继续: {0}")]
    OrchestrationFatal(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 文件读写错误
    #[error("文件错误 ({path}): {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl AppError {
    /// 是否应终止整个分析
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::Validation(_) | AppError::OrchestrationFatal(_)
        )
    }

    /// 创建文件读取错误
    pub fn file(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File {
            path: path.into(),
            source,
        }
    }
}

/// 问题集配置错误
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// 无法解析
    #[error("无法解析问题集配置: {0}")]
    Parse(String),

    /// 缺少 sections
    #[error("问题集中没有任何章节")]
    NoSections,

    /// 字段类型不对
    #[error("{location}: 字段 `{field}` 类型错误，期望 {expected}")]
    WrongType {
        location: String,
        field: &'static str,
        expected: &'static str,
    },

    /// 缺少或为空的 id
    #[error("{location}: 缺少 `{field}`")]
    MissingField {
        location: String,
        field: &'static str,
    },

    /// 章节 id 重复
    #[error("章节 id 重复: {0}")]
    DuplicateSectionId(String),

    /// 问题 id 重复
    #[error("问题 id 重复: {0}")]
    DuplicateQuestionId(String),
}

/// 模型调用错误（单个专家、单个窗口）
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelCallError {
    /// 网络或服务端错误
    #[error("LLM 调用失败 (模型: {model}): {message}")]
    Request { model: String, message: String },

    /// 超时
    #[error("LLM 调用超时 ({expert}, {timeout_secs}s)")]
    Timeout { expert: String, timeout_secs: u64 },

    /// 返回内容为空
    #[error("LLM 返回内容为空 (模型: {model})")]
    EmptyContent { model: String },

    /// 返回结构无法解析
    #[error("LLM 返回结构无法解析 ({expert}): {message}")]
    MalformedResponse { expert: String, message: String },

    /// 提示词超限
    #[error("提示词超出上限 ({expert}): 固定部分 {fixed_tokens} > {ceiling}")]
    OverBudget {
        expert: String,
        fixed_tokens: usize,
        ceiling: usize,
    },

    /// 任务异常退出
    #[error("调用任务异常退出 ({expert}): {message}")]
    TaskFailed { expert: String, message: String },
}

/// 配置错误
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// 取值超出范围
    #[error("配置项 {field} 取值 '{value}' 不合法，应当{expected}")]
    OutOfRange {
        field: &'static str,
        value: String,
        expected: &'static str,
    },
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(AppError::Validation(ValidationError::NoSections).is_fatal());
        assert!(AppError::OrchestrationFatal("no windows".into()).is_fatal());
        assert!(!AppError::ExtractionEmpty {
            window_index: 0,
            pages: vec![1, 2, 3]
        }
        .is_fatal());
        assert!(!AppError::ModelCall(ModelCallError::Timeout {
            expert: "materials".into(),
            timeout_secs: 30
        })
        .is_fatal());
        assert!(!AppError::BudgetExceeded {
            fixed_tokens: 10,
            ceiling: 5
        }
        .is_fatal());
    }

    #[test]
    fn test_validation_error_converts() {
        let err: AppError = ValidationError::DuplicateQuestionId("q1".into()).into();
        assert!(err.to_string().contains("q1"));
    }
}
