//! 提示词构建与模型输出解析
//!
//! 模型按约定返回 JSON：
//!
//! ```json
//! {"answers": [{"question_id": "m1", "answer": "...", "pages": [5], "confidence": 0.8, "reasoning": "..."}]}
//! ```
//!
//! 解析时容忍代码块包裹、前后说明文字、数字形式的 id 与字符串形式的页码。

use std::collections::BTreeSet;

use serde_json::Value;

use crate::models::answer::Pass;
use crate::models::document::DocumentWindow;
use crate::models::question::{Question, Section};
use crate::services::citation::extract_page_mentions;

/// 模型未给出置信度时的默认值
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// 表示"没有找到"的答案文本
const NOT_FOUND_MARKERS: &[&str] = &[
    "not found",
    "not_found",
    "n/a",
    "na",
    "none",
    "unknown",
    "no information",
    "not mentioned",
    "not specified",
    "not stated",
    "no answer",
];

/// 解析后、校验前的单条答案
#[derive(Debug, Clone, PartialEq)]
pub struct ModelAnswer {
    pub question_id: String,
    pub text: String,
    pub pages: BTreeSet<u32>,
    pub confidence: f64,
    pub reasoning: Option<String>,
}

// ========== 人设生成 ==========

/// 人设生成请求 (system, user)
pub fn persona_request(section: &Section) -> (String, String) {
    let system = "You design expert reviewer personas. You write concise, specific system prompts \
                  for a language model that must answer document questions using only quoted evidence."
        .to_string();

    let user = format!(
        r#"Create a specialist persona for the question section "{name}".

The specialist will read excerpts of a long technical document and answer these questions:
{questions}

Respond with a single JSON object and nothing else:
{{"specialization": "<short label of the expertise>", "system_prompt": "<second-person system prompt, 3-6 sentences>"}}"#,
        name = section.name,
        questions = question_block(&section.questions),
    );

    (system, user)
}

/// 解析人设生成结果，返回 (specialization, system_prompt)
pub fn parse_persona_response(section: &Section, content: &str) -> Option<(String, String)> {
    if let Some(value) = extract_json(content) {
        let system_prompt = value
            .get("system_prompt")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())?;
        let specialization = value
            .get("specialization")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&section.name);
        return Some((specialization.to_string(), system_prompt.to_string()));
    }

    // 不是 JSON：整段文本作为 system prompt
    let text = strip_code_fence(content).trim();
    if text.is_empty() {
        None
    } else {
        Some((section.name.clone(), text.to_string()))
    }
}

/// 人设生成失败时使用的通用模板
pub fn generic_persona_prompt(section: &Section) -> String {
    format!(
        "You are a meticulous document analyst specialising in {name}. \
         Answer questions about {name} strictly from the document excerpt you are given. \
         Quote specific values, standards and requirements exactly as written, \
         always cite the page numbers shown in the [Page n] markers, \
         and never invent facts that the excerpt does not support.",
        name = section.name
    )
}

// ========== 专家问答 ==========

/// 窗口说明，位于窗口文本之前
pub fn window_header(window: &DocumentWindow) -> String {
    format!(
        "Document excerpt: pages {} (window {} of {}). Page boundaries are marked as [Page n].",
        window.page_label(),
        window.index + 1,
        window.total_windows
    )
}

/// 编号问题列表
pub fn question_block(questions: &[Question]) -> String {
    questions
        .iter()
        .map(|q| format!("- [{}] {}", q.id, q.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// 输出格式约定；第二轮放宽要求
pub fn response_contract(pass: Pass) -> String {
    let directive = match pass {
        Pass::First => {
            "Answer only questions that the excerpt answers directly. \
             Omit a question entirely when the excerpt does not address it."
        }
        Pass::Second => {
            "These questions were not answered by a first reading of the whole document. \
             Look harder: a partial answer, an answer inferred from closely related statements, \
             or a relevant requirement that only implies the answer is preferred over silence. \
             Say in the reasoning when an answer is inferred, and lower the confidence accordingly. \
             Omit a question only when nothing in the excerpt relates to it."
        }
    };

    format!(
        r#"{directive}

Every answer must cite at least one page number from this excerpt.
Respond with a single JSON object and nothing else:
{{"answers": [{{"question_id": "<id in brackets>", "answer": "<concise answer>", "pages": [<page numbers>], "confidence": <0.0-1.0>, "reasoning": "<one sentence>"}}]}}"#
    )
}

/// 用户提示词中除窗口文本以外的部分 (prefix, suffix)
pub fn user_prompt_frame(window: &DocumentWindow, questions: &[Question], pass: Pass) -> (String, String) {
    let prefix = format!("{}\n\n<excerpt>\n", window_header(window));
    let suffix = format!(
        "\n</excerpt>\n\nQuestions:\n{}\n\n{}",
        question_block(questions),
        response_contract(pass)
    );
    (prefix, suffix)
}

// ========== 输出解析 ==========

/// 解析专家回答
pub fn parse_expert_response(content: &str) -> Result<Vec<ModelAnswer>, String> {
    let value = extract_json(content).ok_or_else(|| {
        format!(
            "找不到 JSON 结构: {}",
            crate::utils::logging::truncate_text(content, 120)
        )
    })?;

    let items = match &value {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => match map.get("answers").or_else(|| map.get("results")) {
            Some(Value::Array(items)) => items.as_slice(),
            Some(_) => return Err("`answers` 不是数组".to_string()),
            None => return Err("缺少 `answers` 字段".to_string()),
        },
        _ => return Err("顶层既不是对象也不是数组".to_string()),
    };

    Ok(items.iter().filter_map(parse_answer_item).collect())
}

fn parse_answer_item(item: &Value) -> Option<ModelAnswer> {
    let question_id = match item.get("question_id").or_else(|| item.get("id"))? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };

    if item.get("found").and_then(Value::as_bool) == Some(false) {
        return None;
    }

    let text = item
        .get("answer")
        .or_else(|| item.get("text"))
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string();

    if question_id.is_empty() || is_not_found(&text) {
        return None;
    }

    let pages = item
        .get("pages")
        .or_else(|| item.get("citations"))
        .or_else(|| item.get("page"))
        .map(parse_pages)
        .unwrap_or_default();

    let confidence = item
        .get("confidence")
        .and_then(parse_confidence)
        .unwrap_or(DEFAULT_CONFIDENCE);

    let reasoning = item
        .get("reasoning")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Some(ModelAnswer {
        question_id,
        text,
        pages,
        confidence,
        reasoning,
    })
}

fn parse_pages(value: &Value) -> BTreeSet<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|p| u32::try_from(p).ok()).into_iter().collect(),
        Value::String(s) => parse_page_string(s),
        Value::Array(items) => items.iter().flat_map(parse_pages).collect(),
        _ => BTreeSet::new(),
    }
}

/// "5"、"p. 5"、"Page 5-6"
fn parse_page_string(s: &str) -> BTreeSet<u32> {
    if let Ok(page) = s.trim().parse::<u32>() {
        return BTreeSet::from([page]);
    }
    let mentions = extract_page_mentions(s);
    if !mentions.is_empty() {
        return mentions;
    }
    s.split(|c: char| !c.is_ascii_digit())
        .filter_map(|part| part.parse::<u32>().ok())
        .collect()
}

fn parse_confidence(value: &Value) -> Option<f64> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok()?,
        _ => return None,
    };
    // 百分制
    let scaled = if raw > 1.0 && raw <= 100.0 { raw / 100.0 } else { raw };
    if scaled.is_finite() {
        Some(scaled.clamp(0.0, 1.0))
    } else {
        None
    }
}

fn is_not_found(text: &str) -> bool {
    let normalized = text
        .trim()
        .trim_end_matches('.')
        .to_lowercase();
    normalized.is_empty() || NOT_FOUND_MARKERS.contains(&normalized.as_str())
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // 去掉语言标记行
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// 从模型输出中取出 JSON 值
fn extract_json(content: &str) -> Option<Value> {
    let body = strip_code_fence(content);
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if value.is_object() || value.is_array() {
            return Some(value);
        }
    }

    // 前后有说明文字：取第一个 { / [ 到最后一个 } / ]
    let start = body.find(['{', '['])?;
    let end = body.rfind(['}', ']'])?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&body[start..=end])
        .ok()
        .filter(|v| v.is_object() || v.is_array())
}
