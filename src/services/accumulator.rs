//! 答案累积 - 业务能力层
//!
//! 把多个窗口、多个轮次的原始答案合并成每个问题一条累积答案：
//! - 引用页码取并集，只增不减
//! - 主答案为置信度最高的候选；置信度完全相同时先到者保留
//! - 其余候选作为变体保留，不丢弃任何证据
//! - 变体与主答案的关系（相似/不同）用可替换的 `TextSimilarity` 判定
//!
//! 主答案和变体顺序只取决于答案的多重集合，与摄入顺序无关（并列置信度除外）。

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::Config;
use crate::models::answer::{AccumulatedAnswer, AnswerVariant, Pass, RawAnswer, VariantRelation};
use crate::models::question::{Question, QuestionSet};
use crate::services::similarity::{normalize_text, TextSimilarity};

/// 各轮的合并阈值
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeThresholds {
    pub first_pass: f64,
    pub second_pass: f64,
}

impl MergeThresholds {
    pub fn from_config(config: &Config) -> Self {
        Self {
            first_pass: config.first_pass_similarity,
            second_pass: config.second_pass_similarity,
        }
    }

    pub fn for_pass(&self, pass: Pass) -> f64 {
        match pass {
            Pass::First => self.first_pass,
            Pass::Second => self.second_pass,
        }
    }
}

impl Default for MergeThresholds {
    fn default() -> Self {
        Self {
            first_pass: 0.75,
            second_pass: 0.3,
        }
    }
}

/// 一次摄入的统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub accepted: usize,
    /// 与现有主答案相似而合并
    pub merged: usize,
    /// 与现有主答案不同，作为新变体保存
    pub new_variants: usize,
    pub rejected_no_citation: usize,
    pub rejected_unknown_question: usize,
    pub rejected_empty_text: usize,
    /// 本次摄入后首次有答案的问题
    pub newly_answered: Vec<String>,
}

#[derive(Debug, Clone)]
struct Candidate {
    normalized: String,
    variant: AnswerVariant,
    first_seen: u64,
}

#[derive(Debug, Clone, Default)]
struct QuestionState {
    candidates: Vec<Candidate>,
    citations: BTreeSet<u32>,
    primary: usize,
}

impl QuestionState {
    fn primary(&self) -> Option<&Candidate> {
        self.candidates.get(self.primary)
    }

    fn elect_primary(&mut self) {
        self.primary = self
            .candidates
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| {
                a.variant
                    .confidence
                    .partial_cmp(&b.variant.confidence)
                    .unwrap_or(Ordering::Equal)
                    // 置信度相同：first_seen 更小者胜出
                    .then_with(|| b.first_seen.cmp(&a.first_seen))
            })
            .map(|(i, _)| i)
            .unwrap_or(0);
    }
}

/// 答案累积器，只由编排层持有并通过 `ingest` 修改
pub struct AnswerAccumulator {
    enabled_questions: Vec<Question>,
    enabled_ids: HashSet<String>,
    similarity: Arc<dyn TextSimilarity>,
    thresholds: MergeThresholds,
    states: HashMap<String, QuestionState>,
    seq: u64,
}

impl AnswerAccumulator {
    pub fn new(
        question_set: &QuestionSet,
        similarity: Arc<dyn TextSimilarity>,
        thresholds: MergeThresholds,
    ) -> Self {
        let enabled_questions: Vec<Question> = question_set.enabled_questions().cloned().collect();
        let enabled_ids = enabled_questions.iter().map(|q| q.id.clone()).collect();

        Self {
            enabled_questions,
            enabled_ids,
            similarity,
            thresholds,
            states: HashMap::new(),
            seq: 0,
        }
    }

    /// 摄入一批原始答案
    pub fn ingest(&mut self, answers: Vec<RawAnswer>) -> IngestReport {
        let mut report = IngestReport::default();

        for raw in answers {
            if !raw.has_citation() {
                warn!(
                    "拒绝无引用页码的答案: 问题 {} (窗口 {})",
                    raw.question_id, raw.window_index
                );
                report.rejected_no_citation += 1;
                continue;
            }
            if !self.enabled_ids.contains(&raw.question_id) {
                warn!("拒绝未知或未启用问题的答案: {}", raw.question_id);
                report.rejected_unknown_question += 1;
                continue;
            }
            let normalized = normalize_text(&raw.text);
            if normalized.is_empty() {
                report.rejected_empty_text += 1;
                continue;
            }

            let seq = self.seq;
            self.seq += 1;

            let threshold = self.thresholds.for_pass(raw.pass);
            let similarity = Arc::clone(&self.similarity);
            let state = self.states.entry(raw.question_id.clone()).or_default();
            let was_empty = state.candidates.is_empty();

            state.citations.extend(raw.citations.iter().copied());

            let confidence = if raw.confidence.is_finite() {
                raw.confidence.clamp(0.0, 1.0)
            } else {
                0.0
            };

            if let Some(existing) = state
                .candidates
                .iter_mut()
                .find(|c| c.normalized == normalized)
            {
                // 同一答案文本：合并引用，取更高置信度的那一次
                existing.variant.citations.extend(raw.citations.iter().copied());
                if confidence > existing.variant.confidence {
                    // 平票按"首次达到当前置信度"的先后判定
                    existing.first_seen = seq;
                    existing.variant.text = raw.text.trim().to_string();
                    existing.variant.confidence = confidence;
                    existing.variant.reasoning = raw.reasoning.clone();
                    existing.variant.window_index = raw.window_index;
                }
                existing.variant.pass = existing.variant.pass.min(raw.pass);
                report.merged += 1;
            } else {
                let is_similar = state
                    .primary()
                    .map(|p| similarity.similarity(&raw.text, &p.variant.text) >= threshold)
                    .unwrap_or(false);
                if was_empty {
                    // 第一个答案直接成为主答案
                } else if is_similar {
                    report.merged += 1;
                } else {
                    report.new_variants += 1;
                }

                state.candidates.push(Candidate {
                    normalized,
                    variant: AnswerVariant {
                        text: raw.text.trim().to_string(),
                        confidence,
                        citations: raw.citations.clone(),
                        reasoning: raw.reasoning.clone(),
                        window_index: raw.window_index,
                        pass: raw.pass,
                        relation: None,
                    },
                    first_seen: seq,
                });
            }

            state.elect_primary();
            report.accepted += 1;

            if was_empty {
                debug!("问题 {} 首次获得答案", raw.question_id);
                report.newly_answered.push(raw.question_id.clone());
            }
        }

        report
    }

    /// 某个问题当前的累积答案
    pub fn answer(&self, question_id: &str) -> Option<AccumulatedAnswer> {
        let state = self.states.get(question_id)?;
        let primary = state.primary()?;

        let mut variants: Vec<AnswerVariant> = state
            .candidates
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != state.primary)
            .map(|(_, c)| {
                let score = self.similarity.similarity(&c.variant.text, &primary.variant.text);
                let relation = if score >= self.thresholds.for_pass(c.variant.pass) {
                    VariantRelation::Corroborating
                } else {
                    VariantRelation::Alternative
                };
                AnswerVariant {
                    relation: Some(relation),
                    ..c.variant.clone()
                }
            })
            .collect();

        variants.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.text.cmp(&b.text))
                .then_with(|| a.window_index.cmp(&b.window_index))
        });

        Some(AccumulatedAnswer {
            question_id: question_id.to_string(),
            primary: primary.variant.clone(),
            citations: state.citations.clone(),
            variants,
        })
    }

    /// 按问题集顺序返回所有已有答案
    pub fn answers(&self) -> Vec<AccumulatedAnswer> {
        self.enabled_questions
            .iter()
            .filter_map(|q| self.answer(&q.id))
            .collect()
    }

    /// 问题最早在哪一轮获得答案
    pub fn answered_in(&self, question_id: &str) -> Option<Pass> {
        self.states
            .get(question_id)?
            .candidates
            .iter()
            .map(|c| c.variant.pass)
            .min()
    }

    pub fn is_answered(&self, question_id: &str) -> bool {
        self.states
            .get(question_id)
            .is_some_and(|s| !s.candidates.is_empty())
    }

    /// 启用但没有任何答案的问题（按问题集顺序）
    pub fn unanswered(&self) -> Vec<Question> {
        self.enabled_questions
            .iter()
            .filter(|q| !self.is_answered(&q.id))
            .cloned()
            .collect()
    }

    pub fn answered_count(&self) -> usize {
        self.enabled_questions
            .iter()
            .filter(|q| self.is_answered(&q.id))
            .count()
    }

    pub fn enabled_question_count(&self) -> usize {
        self.enabled_questions.len()
    }

    pub fn thresholds(&self) -> MergeThresholds {
        self.thresholds
    }
}
