//! 第二轮补充 - 业务能力层
//!
//! 第一轮结束后仍未回答的问题在调用时被冻结为目标集合。
//! 第二轮只复用已缓存的人设，只询问目标问题，目标以外的答案一律丢弃。

use std::collections::HashSet;

use serde::Serialize;
use tracing::{info, warn};

use crate::models::answer::RawAnswer;
use crate::models::question::Question;
use crate::services::accumulator::AnswerAccumulator;
use crate::services::dispatcher::ExpertAssignment;
use crate::services::persona_cache::ExpertPersonaCache;

/// 第二轮的执行报告
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SecondPassReport {
    /// 冻结的目标问题 id（问题集顺序）
    pub targeted: Vec<String>,
    /// 第二轮中首次获得答案的目标问题
    pub newly_answered: Vec<String>,
    pub windows_processed: usize,
    pub cancelled: bool,
}

/// 第二轮计划
#[derive(Debug, Clone)]
pub struct SecondPassEnhancer {
    targets: Vec<Question>,
    target_ids: HashSet<String>,
    assignments: Vec<ExpertAssignment>,
}

impl SecondPassEnhancer {
    /// 冻结当前未回答的问题；没有目标时返回 `None`
    pub fn plan(accumulator: &AnswerAccumulator, personas: &ExpertPersonaCache) -> Option<Self> {
        let targets = accumulator.unanswered();
        if targets.is_empty() {
            return None;
        }

        // 按章节分组，保持问题集顺序
        let mut assignments: Vec<ExpertAssignment> = Vec::new();
        for question in &targets {
            if let Some(existing) = assignments
                .iter_mut()
                .find(|a| a.section_id() == question.section_id)
            {
                existing.questions.push(question.clone());
                continue;
            }
            match personas.get(&question.section_id) {
                Some(persona) => assignments.push(ExpertAssignment {
                    persona,
                    questions: vec![question.clone()],
                }),
                None => warn!(
                    "[章节 {}] ⚠️ 没有缓存的人设，问题 {} 不参与第二轮",
                    question.section_id, question.id
                ),
            }
        }

        let target_ids = targets.iter().map(|q| q.id.clone()).collect();
        info!(
            "🔁 第二轮目标: {} 个问题，{} 位专家",
            targets.len(),
            assignments.len()
        );

        Some(Self {
            targets,
            target_ids,
            assignments,
        })
    }

    pub fn targets(&self) -> &[Question] {
        &self.targets
    }

    pub fn is_target(&self, question_id: &str) -> bool {
        self.target_ids.contains(question_id)
    }

    pub fn assignments(&self) -> &[ExpertAssignment] {
        &self.assignments
    }

    /// 只保留目标问题的答案，返回 (保留, 丢弃数)
    pub fn retain_targets(&self, answers: Vec<RawAnswer>) -> (Vec<RawAnswer>, usize) {
        let before = answers.len();
        let kept: Vec<RawAnswer> = answers
            .into_iter()
            .filter(|a| self.is_target(&a.question_id))
            .collect();
        let discarded = before - kept.len();
        (kept, discarded)
    }

    /// 根据累积器当前状态生成报告
    pub fn report(
        &self,
        accumulator: &AnswerAccumulator,
        windows_processed: usize,
        cancelled: bool,
    ) -> SecondPassReport {
        SecondPassReport {
            targeted: self.targets.iter().map(|q| q.id.clone()).collect(),
            newly_answered: self
                .targets
                .iter()
                .filter(|q| accumulator.is_answered(&q.id))
                .map(|q| q.id.clone())
                .collect(),
            windows_processed,
            cancelled,
        }
    }
}
