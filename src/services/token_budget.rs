//! Token 预算 - 业务能力层
//!
//! 每次调用的提示词都必须低于配置的上限；超限时按固定规则截断窗口文本：
//! 保留前 ~60% 与后 ~40%，中间用省略标记替代，并在标记里列出被省略的页码。
//! 这是唯一允许缩减输入的地方。

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::config::Config;
use crate::error::{AppError, AppResult};

/// 粗略估算：每 4 个字符 1 个 token
pub const CHARS_PER_TOKEN: usize = 4;

/// 估算文本的 token 数
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

fn page_marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"\[Page (\d+)\]").expect("page marker regex is valid"))
}

/// 预算检查结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetCheck {
    Allowed { estimated: usize },
    MustTruncate { estimated: usize, ceiling: usize },
}

/// 适配预算后的窗口文本
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FittedText {
    pub text: String,
    /// 窗口文本部分的估算 token
    pub estimated_tokens: usize,
    pub truncated: bool,
    /// 正文被省略的页码
    pub elided_pages: Vec<u32>,
}

/// 预算与累计用量
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBudget {
    pub max_prompt_tokens: usize,
    pub max_completion_tokens: u32,
    pub prompt_tokens_used: usize,
    pub completion_tokens_used: usize,
    pub calls: usize,
    pub truncations: usize,
}

/// 用量快照
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageSnapshot {
    pub calls: usize,
    pub truncations: usize,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
    pub estimated_cost_usd: f64,
}

/// Token 预算跟踪器，只由编排层持有并修改
#[derive(Debug, Clone)]
pub struct TokenBudgetTracker {
    budget: TokenBudget,
    head_ratio: f64,
    prompt_cost_per_1k: f64,
    completion_cost_per_1k: f64,
}

impl TokenBudgetTracker {
    pub fn new(config: &Config) -> Self {
        Self {
            budget: TokenBudget {
                max_prompt_tokens: config.max_prompt_tokens,
                max_completion_tokens: config.max_completion_tokens,
                prompt_tokens_used: 0,
                completion_tokens_used: 0,
                calls: 0,
                truncations: 0,
            },
            head_ratio: config.truncation_head_ratio,
            prompt_cost_per_1k: config.prompt_cost_per_1k,
            completion_cost_per_1k: config.completion_cost_per_1k,
        }
    }

    pub fn ceiling(&self) -> usize {
        self.budget.max_prompt_tokens
    }

    pub fn check(&self, estimated: usize) -> BudgetCheck {
        if estimated <= self.budget.max_prompt_tokens {
            BudgetCheck::Allowed { estimated }
        } else {
            BudgetCheck::MustTruncate {
                estimated,
                ceiling: self.budget.max_prompt_tokens,
            }
        }
    }

    /// 让窗口文本与固定部分（人设、问题列表、格式说明）一起落在上限以内
    pub fn fit_window(&mut self, window_text: &str, fixed_tokens: usize) -> AppResult<FittedText> {
        let ceiling = self.budget.max_prompt_tokens;
        let window_tokens = estimate_tokens(window_text);

        match self.check(fixed_tokens + window_tokens) {
            BudgetCheck::Allowed { .. } => Ok(FittedText {
                text: window_text.to_string(),
                estimated_tokens: window_tokens,
                truncated: false,
                elided_pages: Vec::new(),
            }),
            BudgetCheck::MustTruncate { estimated, .. } => {
                let over_budget = AppError::BudgetExceeded {
                    fixed_tokens,
                    ceiling,
                };
                if fixed_tokens >= ceiling {
                    return Err(over_budget);
                }

                let available_chars = (ceiling - fixed_tokens) * CHARS_PER_TOKEN;
                let fitted = truncate_middle(window_text, available_chars, self.head_ratio)
                    .ok_or(over_budget)?;

                debug!(
                    "窗口文本超出预算，已截断: 估算 {} > 上限 {}，保留 {} token",
                    estimated, ceiling, fitted.estimated_tokens
                );
                self.budget.truncations += 1;
                Ok(fitted)
            }
        }
    }

    /// 记录一次调用的实际用量
    pub fn record(&mut self, prompt_tokens: usize, completion_tokens: usize) {
        self.budget.calls += 1;
        self.budget.prompt_tokens_used += prompt_tokens;
        self.budget.completion_tokens_used += completion_tokens;
    }

    pub fn report(&self) -> UsageSnapshot {
        let prompt = self.budget.prompt_tokens_used;
        let completion = self.budget.completion_tokens_used;
        UsageSnapshot {
            calls: self.budget.calls,
            truncations: self.budget.truncations,
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
            estimated_cost_usd: prompt as f64 / 1000.0 * self.prompt_cost_per_1k
                + completion as f64 / 1000.0 * self.completion_cost_per_1k,
        }
    }
}

/// 保留头尾，省略中间；结果字符数不超过 `max_chars`。
/// 连省略标记都放不下时返回 `None`。
fn truncate_middle(text: &str, max_chars: usize, head_ratio: f64) -> Option<FittedText> {
    let total_chars = text.chars().count();
    let mut reserve = 0usize;

    // 标记长度取决于被省略的页，页又取决于标记占用的空间，迭代到稳定为止
    loop {
        if reserve >= max_chars {
            return None;
        }
        let body = max_chars - reserve;
        let head = (body as f64 * head_ratio).floor() as usize;
        let tail = body - head;

        let tail_start_char = total_chars.saturating_sub(tail).max(head);
        let head_end = byte_offset(text, head);
        let tail_start = byte_offset(text, tail_start_char);

        let elided_pages: Vec<u32> = page_marker()
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let cut = whole.start() < tail_start && whole.end() > head_end;
                if cut {
                    caps.get(1)?.as_str().parse().ok()
                } else {
                    None
                }
            })
            .collect();

        let marker = elision_marker(tail_start_char - head, &elided_pages);
        let marker_chars = marker.chars().count();

        if marker_chars <= reserve {
            let truncated = format!("{}{}{}", &text[..head_end], marker, &text[tail_start..]);
            let estimated_tokens = estimate_tokens(&truncated);
            return Some(FittedText {
                text: truncated,
                estimated_tokens,
                truncated: true,
                elided_pages,
            });
        }
        reserve = marker_chars;
    }
}

fn elision_marker(omitted: usize, elided_pages: &[u32]) -> String {
    if elided_pages.is_empty() {
        format!(
            "\n\n[... {} characters omitted to fit the token budget ...]\n\n",
            omitted
        )
    } else {
        let pages: Vec<String> = elided_pages.iter().map(|p| p.to_string()).collect();
        format!(
            "\n\n[... {} characters omitted to fit the token budget; omitted text includes the start of page(s) {} ...]\n\n",
            omitted,
            pages.join(", ")
        )
    }
}

/// 第 `char_index` 个字符的字节偏移
fn byte_offset(text: &str, char_index: usize) -> usize {
    text.char_indices()
        .nth(char_index)
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}
