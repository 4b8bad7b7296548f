/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::models::event::ProgressEvent;
use crate::models::result::AnalysisStatistics;

/// 初始化 tracing 订阅者
///
/// 默认级别为 `info`，`verbose` 时为 `debug`；设置了 `RUST_LOG` 时以其为准。
/// 重复调用不会报错。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 多专家文档问答模式");
    info!("🤖 模型: {}", config.llm_model_name);
    info!("📊 最大并发调用数: {}", config.max_concurrent_calls);
    info!("📑 每个窗口页数: {}", config.window_stride);
    info!("🧮 提示词上限: {} token", config.max_prompt_tokens);
    info!(
        "🔁 第二轮: {}",
        if config.enable_second_pass { "开启" } else { "关闭" }
    );
    info!("{}", "=".repeat(60));
}

/// 记录加载结果
pub fn log_inputs_loaded(sections: usize, questions: usize, pages: usize) {
    info!("✓ 问题集: {} 个章节，{} 个问题", sections, questions);
    info!("✓ 文档: {} 页\n", pages);
}

/// 把进度事件写入日志
pub fn log_event(event: &ProgressEvent) {
    match event {
        ProgressEvent::StateChanged { from, to } => info!("🔄 状态: {} → {}", from, to),
        ProgressEvent::PersonaCreated {
            section_id,
            specialization,
            fallback,
        } => {
            if *fallback {
                info!("🧑‍🔬 [章节 {}] 使用通用人设", section_id);
            } else {
                info!("🧑‍🔬 [章节 {}] 专家人设: {}", section_id, specialization);
            }
        }
        ProgressEvent::PassComplete {
            pass,
            answered,
            unanswered,
        } => {
            info!("\n{}", "─".repeat(60));
            info!("✓ {}完成: 已回答 {}，未回答 {}", pass, answered, unanswered);
            info!("{}", "─".repeat(60));
        }
        ProgressEvent::Cancelled { state } => warn!("⏹️ 分析在 {} 阶段被取消", state),
        ProgressEvent::Error { message, fatal } => {
            if *fatal {
                warn!("❌ 致命错误: {}", message);
            } else {
                debug!("⚠️ {}", message);
            }
        }
        ProgressEvent::Completed {
            coverage_pct,
            answered,
            total_questions,
        } => info!(
            "🎉 分析完成: {}/{} 题，覆盖率 {:.1}%",
            answered, total_questions, coverage_pct
        ),
        // 窗口级事件已由流程层记录
        other => debug!("事件: {}", other.name()),
    }
}

/// 打印最终统计信息
pub fn print_final_stats(stats: &AnalysisStatistics, output_path: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!(
        "✅ 已回答: {}/{} ({:.1}%)",
        stats.answered, stats.enabled_questions, stats.coverage_pct
    );
    info!(
        "   第一轮 {} / 第二轮 {}",
        stats.answered_first_pass, stats.answered_second_pass
    );
    info!(
        "📌 必答题: {}/{}",
        stats.required_answered, stats.required_total
    );
    info!("❔ 未找到: {}", stats.unanswered);
    info!("⏭️ 跳过 (章节禁用): {}", stats.skipped);
    info!("📈 平均置信度: {:.2}", stats.average_confidence);
    info!(
        "🪟 窗口: {} (空 {})，专家调用 {} (失败 {})",
        stats.windows_total, stats.windows_empty, stats.expert_calls, stats.failed_calls
    );
    info!(
        "🧮 Token: {} (提示 {} / 生成 {})，截断 {} 次，估算费用 ${:.4}",
        stats.total_tokens,
        stats.prompt_tokens,
        stats.completion_tokens,
        stats.truncations,
        stats.estimated_cost_usd
    );
    info!("⏱️ 耗时: {:.1}s", stats.elapsed_ms as f64 / 1000.0);
    if stats.cancelled {
        warn!("⏹️ 本次分析被取消，结果不完整");
    }
    info!("{}", "=".repeat(60));
    info!("\n结果已保存至: {}", output_path);
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
