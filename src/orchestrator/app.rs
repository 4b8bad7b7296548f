//! 应用主结构 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责资源管理和一次分析的生命周期。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：校验配置、加载问题集和文档、创建模型客户端
//! 2. **事件消费**：把进度事件写入日志
//! 3. **取消**：Ctrl-C 设置取消标志，已完成的部分仍会输出
//! 4. **结果输出**：把 `AnalysisResult` 写成 JSON
//! 5. **全局统计**：输出最终统计信息

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::Config;
use crate::infrastructure::llm_client::{LanguageModel, OpenAiModel};
use crate::models::document::Page;
use crate::models::loaders::{load_pages, load_question_set};
use crate::models::question::QuestionSet;
use crate::orchestrator::analysis::{AnalysisReport, Orchestrator};
use crate::orchestrator::session::AnalysisSession;
use crate::utils::logging::{log_event, log_inputs_loaded, log_startup, print_final_stats};

/// 应用主结构
pub struct App {
    orchestrator: Orchestrator,
    question_set: QuestionSet,
    pages: Vec<Page>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        config.validate().context("配置校验失败")?;
        log_startup(&config);

        let model: Arc<dyn LanguageModel> = Arc::new(OpenAiModel::new(&config));
        Self::with_model(config, model).await
    }

    /// 使用指定的模型实现初始化
    pub async fn with_model(config: Config, model: Arc<dyn LanguageModel>) -> Result<Self> {
        info!("\n📁 正在加载问题集与文档...");
        let question_set = load_question_set(Path::new(&config.question_set_path))
            .await
            .with_context(|| format!("无法加载问题集: {}", config.question_set_path))?;
        let pages = load_pages(Path::new(&config.document_path))
            .await
            .with_context(|| format!("无法加载文档: {}", config.document_path))?;

        log_inputs_loaded(
            question_set.sections.len(),
            question_set.total_questions(),
            pages.len(),
        );

        Ok(Self {
            orchestrator: Orchestrator::new(config, model),
            question_set,
            pages,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<AnalysisReport> {
        let config = self.orchestrator.config();
        let (session, mut rx) = AnalysisSession::new();

        // 进度事件写入日志
        let event_logger = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                log_event(&event);
            }
        });

        // Ctrl-C 取消
        let cancel = session.cancel_handle();
        let ctrl_c = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("⏹️ 收到 Ctrl-C，当前窗口完成后停止...");
                cancel.cancel();
            }
        });

        let outcome = self
            .orchestrator
            .run(&session, &self.question_set, self.pages.clone())
            .await;

        ctrl_c.abort();
        drop(session);
        let _ = event_logger.await;

        let report = outcome.context("分析失败")?;
        write_result(&report, &config.output_path).await?;
        print_final_stats(&report.result.statistics, &config.output_path);

        Ok(report)
    }
}

async fn write_result(report: &AnalysisReport, output_path: &str) -> Result<()> {
    let json = serde_json::to_string_pretty(&report.result).context("结果序列化失败")?;
    tokio::fs::write(output_path, json)
        .await
        .with_context(|| format!("无法写入结果文件: {}", output_path))?;
    Ok(())
}
