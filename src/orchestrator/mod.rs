//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责一次分析的调度和资源管理，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `app` - 应用主结构
//! - 管理应用生命周期（初始化、运行）
//! - 加载问题集与文档
//! - 消费进度事件、处理 Ctrl-C、输出结果和全局统计
//!
//! ### `analysis` - 单次分析编排器
//! - 持有累积器、token 预算、人设缓存
//! - 按顺序遍历窗口，执行两轮
//! - 编译最终结果
//!
//! ### `state` / `session`
//! - 状态机与合法转换
//! - 调用方持有的会话：取消标志和事件通道
//!
//! ## 层次关系
//!
//! ```text
//! app (处理一次运行)
//!     ↓
//! analysis (处理 Vec<DocumentWindow> x 两轮)
//!     ↓
//! workflow::WindowFlow (处理单个窗口)
//!     ↓
//! services (能力层：dispatch / accumulate / budget / compile)
//!     ↓
//! infrastructure (基础设施：LanguageModel / ProgressEmitter)
//! ```

pub mod analysis;
pub mod app;
pub mod session;
pub mod state;

// 重新导出主要类型
pub use analysis::{AnalysisReport, Orchestrator};
pub use app::App;
pub use session::{AnalysisSession, CancelHandle};
pub use state::{AnalysisState, StateMachine};
