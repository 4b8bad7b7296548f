//! 文本相似度
//!
//! 累积器只依赖 `TextSimilarity`，可以换成基于向量的实现而不改动合并规则。

use std::collections::HashSet;

use phf::phf_set;

/// 英文停用词，不参与重合度计算
static STOP_WORDS: phf::Set<&'static str> = phf_set! {
    "a", "an", "the", "and", "or", "of", "to", "in", "on", "at", "for", "by",
    "with", "is", "are", "was", "were", "be", "been", "as", "it", "its", "that",
    "this", "these", "those", "from", "per", "not", "no",
};

/// 相似度能力，返回值位于 [0, 1]
pub trait TextSimilarity: Send + Sync {
    fn similarity(&self, a: &str, b: &str) -> f64;
}

/// 词重合系数：|A ∩ B| / min(|A|, |B|)
///
/// 较短答案的词全部出现在较长答案中时得 1.0，
/// 因此 "vinyl ester" 与 "vinyl ester resin per spec F1216" 视为同一答案的不同详略。
#[derive(Debug, Clone, Copy, Default)]
pub struct WordOverlapSimilarity;

impl TextSimilarity for WordOverlapSimilarity {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        let left = tokenize(a);
        let right = tokenize(b);

        if left.is_empty() && right.is_empty() {
            return if normalize_text(a) == normalize_text(b) { 1.0 } else { 0.0 };
        }
        if left.is_empty() || right.is_empty() {
            return 0.0;
        }

        let shared = left.intersection(&right).count();
        shared as f64 / left.len().min(right.len()) as f64
    }
}

/// 小写、按非字母数字切分、去停用词
pub fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .filter(|w| !STOP_WORDS.contains(w.as_str()))
        .collect()
}

/// 用于判断"同一答案文本"的归一化：小写并压缩空白
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}
