//! # Expert QA
//!
//! 用多位"专家"模型逐窗口阅读长文档、回答大批结构化问题的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有外部资源，只暴露能力
//! - `LanguageModel` - 调用一次模型的能力（`OpenAiModel` 为默认实现）
//! - `ProgressEmitter` - 发出进度事件的能力
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `DocumentWindower` - 文档分窗
//! - `TokenBudgetTracker` - token 预算与截断
//! - `ExpertPersonaCache` - 专家人设缓存
//! - `MultiExpertDispatcher` - 有界并发的多专家调度
//! - `AnswerAccumulator` - 答案合并与引用保留
//! - `SecondPassEnhancer` - 第二轮补充
//! - `result_compiler` - 结果编译
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个窗口"的完整处理流程
//! - `WindowCtx` - 上下文封装（轮次 + 窗口序号）
//! - `WindowFlow` - 流程编排（空窗口检查 → 调度 → 过滤 → 摄入）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/analysis` - 单次分析编排器，持有可变状态，驱动状态机
//! - `orchestrator/app` - 应用主结构，管理输入输出和取消
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

#[cfg(test)]
pub(crate) mod test_support;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult, ConfigError, ModelCallError, ValidationError};
pub use infrastructure::{LanguageModel, ModelResponse, OpenAiModel, ProgressEmitter};
pub use models::{AnalysisResult, DocumentWindow, Page, ProgressEvent, Question, QuestionSet, Section};
pub use orchestrator::{AnalysisReport, AnalysisSession, AnalysisState, App, Orchestrator};
pub use workflow::{WindowCtx, WindowFlow};
