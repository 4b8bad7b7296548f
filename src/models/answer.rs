use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// 分析轮次
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pass {
    First,
    Second,
}

impl Pass {
    pub fn number(self) -> u8 {
        match self {
            Pass::First => 1,
            Pass::Second => 2,
        }
    }
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "第{}轮", self.number())
    }
}

/// 单次模型调用产生的答案，创建后不再修改
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawAnswer {
    pub question_id: String,
    pub section_id: String,
    pub text: String,
    /// 引用页码，至少一个
    pub citations: BTreeSet<u32>,
    /// [0, 1]
    pub confidence: f64,
    pub reasoning: Option<String>,
    pub window_index: usize,
    pub pass: Pass,
}

impl RawAnswer {
    pub fn has_citation(&self) -> bool {
        !self.citations.is_empty()
    }
}

/// 与主答案的关系
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantRelation {
    /// 与主答案相似，已合并
    Corroborating,
    /// 与主答案不同的备选说法
    Alternative,
}

/// 累积后的一个候选答案
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerVariant {
    pub text: String,
    pub confidence: f64,
    pub citations: BTreeSet<u32>,
    pub reasoning: Option<String>,
    pub window_index: usize,
    pub pass: Pass,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relation: Option<VariantRelation>,
}

/// 某个问题的累积答案
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccumulatedAnswer {
    pub question_id: String,
    pub primary: AnswerVariant,
    /// 所有已摄入答案引用页码的并集，只增不减
    pub citations: BTreeSet<u32>,
    pub variants: Vec<AnswerVariant>,
}

impl AccumulatedAnswer {
    pub fn confidence(&self) -> f64 {
        self.primary.confidence
    }
}
