use std::collections::BTreeSet;

use serde::Serialize;

use crate::models::answer::{AnswerVariant, Pass};

/// 问题在最终结果中的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    Answered,
    /// 启用但没有找到证据
    NotFound,
    /// 所在章节被禁用
    Skipped,
}

/// 单个问题的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionResult {
    pub question_id: String,
    pub question: String,
    pub required: bool,
    pub status: QuestionStatus,
    pub answer: Option<String>,
    pub confidence: Option<f64>,
    pub citations: BTreeSet<u32>,
    pub reasoning: Option<String>,
    /// 主答案来自哪一轮
    pub answered_in: Option<Pass>,
    pub variants: Vec<AnswerVariant>,
    /// 引用的脚注编号
    pub footnotes: Vec<usize>,
}

impl QuestionResult {
    pub fn is_answered(&self) -> bool {
        self.status == QuestionStatus::Answered
    }
}

/// 单个章节的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionResult {
    pub section_id: String,
    pub name: String,
    pub enabled: bool,
    pub answered: Vec<QuestionResult>,
    pub unanswered: Vec<QuestionResult>,
}

/// 去重后的脚注
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Footnote {
    pub number: usize,
    pub page: u32,
    /// 引用该页的问题 id，按首次引用顺序
    pub cited_by: Vec<String>,
    pub text: String,
}

/// 汇总统计
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalysisStatistics {
    pub total_questions: usize,
    pub enabled_questions: usize,
    pub answered: usize,
    pub unanswered: usize,
    pub skipped: usize,
    pub required_total: usize,
    pub required_answered: usize,
    /// 已回答 / 启用问题，百分比
    pub coverage_pct: f64,
    /// 仅统计已回答问题
    pub average_confidence: f64,
    pub answered_first_pass: usize,
    pub answered_second_pass: usize,
    pub windows_total: usize,
    pub windows_empty: usize,
    pub expert_calls: usize,
    pub failed_calls: usize,
    pub truncations: usize,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
    pub estimated_cost_usd: f64,
    pub elapsed_ms: u128,
    pub second_pass_ran: bool,
    pub cancelled: bool,
}

/// 一次分析的最终结果，编译后不可变
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub sections: Vec<SectionResult>,
    pub footnotes: Vec<Footnote>,
    pub statistics: AnalysisStatistics,
}

impl AnalysisResult {
    pub fn question(&self, question_id: &str) -> Option<&QuestionResult> {
        self.sections
            .iter()
            .flat_map(|s| s.answered.iter().chain(s.unanswered.iter()))
            .find(|q| q.question_id == question_id)
    }

    pub fn all_questions(&self) -> impl Iterator<Item = &QuestionResult> {
        self.sections
            .iter()
            .flat_map(|s| s.answered.iter().chain(s.unanswered.iter()))
    }
}
