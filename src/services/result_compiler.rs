//! 结果编译 - 业务能力层
//!
//! 纯函数：问题集 + 累积器 + 用量 + 运行指标 → `AnalysisResult`。
//! 问题集中的每个问题在结果里恰好出现一次。

use std::collections::BTreeMap;
use std::time::Duration;

use crate::models::answer::Pass;
use crate::models::question::{Question, QuestionSet};
use crate::models::result::{
    AnalysisResult, AnalysisStatistics, Footnote, QuestionResult, QuestionStatus, SectionResult,
};
use crate::services::accumulator::AnswerAccumulator;
use crate::services::token_budget::UsageSnapshot;

/// 编排过程中收集的运行指标
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunMetrics {
    pub windows_total: usize,
    pub windows_empty: usize,
    pub expert_calls: usize,
    pub failed_calls: usize,
    pub second_pass_ran: bool,
    pub cancelled: bool,
    pub elapsed: Duration,
}

/// 脚注表：每个被引用的页一条，按首次出现编号，并记录引用它的问题
#[derive(Debug, Default)]
struct FootnoteTable {
    by_page: BTreeMap<u32, usize>,
    notes: Vec<Footnote>,
}

impl FootnoteTable {
    fn cite(&mut self, page: u32, question_id: &str) -> usize {
        let number = match self.by_page.get(&page) {
            Some(number) => *number,
            None => {
                let number = self.notes.len() + 1;
                self.by_page.insert(page, number);
                self.notes.push(Footnote {
                    number,
                    page,
                    cited_by: Vec::new(),
                    text: String::new(),
                });
                number
            }
        };

        let note = &mut self.notes[number - 1];
        if !note.cited_by.iter().any(|id| id == question_id) {
            note.cited_by.push(question_id.to_string());
        }
        number
    }

    fn into_footnotes(self) -> Vec<Footnote> {
        self.notes
            .into_iter()
            .map(|mut note| {
                note.text = format!("Document page {}, cited by {}", note.page, note.cited_by.join(", "));
                note
            })
            .collect()
    }
}

/// 编译最终结果
pub fn compile(
    question_set: &QuestionSet,
    accumulator: &AnswerAccumulator,
    usage: &UsageSnapshot,
    metrics: RunMetrics,
) -> AnalysisResult {
    let mut footnotes = FootnoteTable::default();
    let mut stats = AnalysisStatistics::default();
    let mut confidence_sum = 0.0;

    let mut sections = Vec::with_capacity(question_set.sections.len());
    for section in &question_set.sections {
        let mut answered = Vec::new();
        let mut unanswered = Vec::new();

        for question in &section.questions {
            stats.total_questions += 1;
            if question.required {
                stats.required_total += 1;
            }

            if !section.enabled {
                stats.skipped += 1;
                unanswered.push(empty_result(question, QuestionStatus::Skipped));
                continue;
            }
            stats.enabled_questions += 1;

            let Some(answer) = accumulator.answer(&question.id) else {
                stats.unanswered += 1;
                unanswered.push(empty_result(question, QuestionStatus::NotFound));
                continue;
            };

            stats.answered += 1;
            if question.required {
                stats.required_answered += 1;
            }
            confidence_sum += answer.confidence();

            let answered_in = accumulator.answered_in(&question.id);
            match answered_in {
                Some(Pass::First) => stats.answered_first_pass += 1,
                Some(Pass::Second) => stats.answered_second_pass += 1,
                None => {}
            }

            let notes = answer
                .citations
                .iter()
                .map(|page| footnotes.cite(*page, &question.id))
                .collect();

            answered.push(QuestionResult {
                question_id: question.id.clone(),
                question: question.text.clone(),
                required: question.required,
                status: QuestionStatus::Answered,
                answer: Some(answer.primary.text.clone()),
                confidence: Some(answer.confidence()),
                citations: answer.citations.clone(),
                reasoning: answer.primary.reasoning.clone(),
                answered_in,
                variants: answer.variants,
                footnotes: notes,
            });
        }

        sections.push(SectionResult {
            section_id: section.id.clone(),
            name: section.name.clone(),
            enabled: section.enabled,
            answered,
            unanswered,
        });
    }

    if stats.enabled_questions > 0 {
        stats.coverage_pct = stats.answered as f64 / stats.enabled_questions as f64 * 100.0;
    }
    if stats.answered > 0 {
        stats.average_confidence = confidence_sum / stats.answered as f64;
    }

    stats.windows_total = metrics.windows_total;
    stats.windows_empty = metrics.windows_empty;
    stats.expert_calls = metrics.expert_calls;
    stats.failed_calls = metrics.failed_calls;
    stats.second_pass_ran = metrics.second_pass_ran;
    stats.cancelled = metrics.cancelled;
    stats.elapsed_ms = metrics.elapsed.as_millis();

    stats.truncations = usage.truncations;
    stats.prompt_tokens = usage.prompt_tokens;
    stats.completion_tokens = usage.completion_tokens;
    stats.total_tokens = usage.total_tokens;
    stats.estimated_cost_usd = usage.estimated_cost_usd;

    AnalysisResult {
        sections,
        footnotes: footnotes.into_footnotes(),
        statistics: stats,
    }
}

fn empty_result(question: &Question, status: QuestionStatus) -> QuestionResult {
    QuestionResult {
        question_id: question.id.clone(),
        question: question.text.clone(),
        required: question.required,
        status,
        answer: None,
        confidence: None,
        citations: Default::default(),
        reasoning: None,
        answered_in: None,
        variants: Vec::new(),
        footnotes: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use super::*;
    use crate::models::answer::RawAnswer;
    use crate::models::question::fixtures::question_set;
    use crate::services::accumulator::MergeThresholds;
    use crate::services::similarity::WordOverlapSimilarity;

    fn raw(question_id: &str, text: &str, pages: &[u32], confidence: f64, pass: Pass) -> RawAnswer {
        RawAnswer {
            question_id: question_id.to_string(),
            section_id: question_id.split('-').next().unwrap_or_default().to_string(),
            text: text.to_string(),
            citations: pages.iter().copied().collect(),
            confidence,
            reasoning: None,
            window_index: 0,
            pass,
        }
    }

    #[test]
    fn test_every_question_appears_exactly_once() {
        let set = question_set(&[("a", true, 3), ("b", false, 2), ("c", true, 1)]);
        let mut acc = AnswerAccumulator::new(&set, Arc::new(WordOverlapSimilarity), MergeThresholds::default());
        acc.ingest(vec![
            raw("a-q1", "Vinyl ester", &[5, 6], 0.9, Pass::First),
            raw("c-q1", "Steam cure", &[6, 9], 0.4, Pass::Second),
        ]);

        let result = compile(&set, &acc, &UsageSnapshot::default(), RunMetrics::default());

        let mut ids: Vec<&str> = result.all_questions().map(|q| q.question_id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, ["a-q1", "a-q2", "a-q3", "b-q1", "b-q2", "c-q1"]);

        assert_eq!(result.question("b-q1").unwrap().status, QuestionStatus::Skipped);
        assert_eq!(result.question("a-q2").unwrap().status, QuestionStatus::NotFound);
        assert_eq!(result.question("c-q1").unwrap().answered_in, Some(Pass::Second));

        let stats = &result.statistics;
        assert_eq!(stats.total_questions, 6);
        assert_eq!(stats.enabled_questions, 4);
        assert_eq!(stats.answered, 2);
        assert_eq!(stats.unanswered, 2);
        assert_eq!(stats.skipped, 2);
        assert_eq!(stats.required_total, 3);
        assert_eq!(stats.required_answered, 2);
        assert!((stats.coverage_pct - 50.0).abs() < 1e-9);
        assert!((stats.average_confidence - 0.65).abs() < 1e-9);
        assert_eq!(stats.answered_first_pass, 1);
        assert_eq!(stats.answered_second_pass, 1);
    }

    #[test]
    fn test_footnotes_deduplicated_by_page() {
        let set = question_set(&[("a", true, 2)]);
        let mut acc = AnswerAccumulator::new(&set, Arc::new(WordOverlapSimilarity), MergeThresholds::default());
        acc.ingest(vec![
            raw("a-q1", "Vinyl ester", &[5, 6], 0.9, Pass::First),
            raw("a-q2", "Steam cure", &[6, 9], 0.8, Pass::First),
        ]);

        let result = compile(&set, &acc, &UsageSnapshot::default(), RunMetrics::default());

        let pages: Vec<u32> = result.footnotes.iter().map(|f| f.page).collect();
        assert_eq!(pages, [5, 6, 9]);
        assert_eq!(result.question("a-q1").unwrap().footnotes, [1, 2]);
        assert_eq!(result.question("a-q2").unwrap().footnotes, [2, 3]);
        assert_eq!(result.question("a-q2").unwrap().citations, BTreeSet::from([6, 9]));
    }

    #[test]
    fn test_footnote_text_names_citing_questions() {
        let set = question_set(&[("a", true, 2), ("b", true, 1)]);
        let mut acc = AnswerAccumulator::new(&set, Arc::new(WordOverlapSimilarity), MergeThresholds::default());
        acc.ingest(vec![
            raw("a-q1", "Vinyl ester", &[5, 6], 0.9, Pass::First),
            raw("a-q2", "Steam cure", &[6], 0.8, Pass::First),
            raw("b-q1", "6 mm", &[6], 0.7, Pass::First),
        ]);

        let result = compile(&set, &acc, &UsageSnapshot::default(), RunMetrics::default());

        assert_eq!(result.footnotes[0].text, "Document page 5, cited by a-q1");
        assert_eq!(result.footnotes[1].page, 6);
        assert_eq!(result.footnotes[1].cited_by, ["a-q1", "a-q2", "b-q1"]);
        assert_eq!(result.footnotes[1].text, "Document page 6, cited by a-q1, a-q2, b-q1");
    }

    #[test]
    fn test_usage_and_metrics_flow_into_statistics() {
        let set = question_set(&[("a", true, 1)]);
        let acc = AnswerAccumulator::new(&set, Arc::new(WordOverlapSimilarity), MergeThresholds::default());
        let usage = UsageSnapshot {
            calls: 4,
            truncations: 1,
            prompt_tokens: 900,
            completion_tokens: 100,
            total_tokens: 1000,
            estimated_cost_usd: 0.01,
        };
        let metrics = RunMetrics {
            windows_total: 3,
            windows_empty: 1,
            expert_calls: 2,
            failed_calls: 1,
            second_pass_ran: true,
            cancelled: true,
            elapsed: Duration::from_millis(1500),
        };

        let stats = compile(&set, &acc, &usage, metrics).statistics;
        assert_eq!(stats.coverage_pct, 0.0);
        assert_eq!(stats.truncations, 1);
        assert_eq!(stats.total_tokens, 1000);
        assert_eq!(stats.windows_empty, 1);
        assert_eq!(stats.elapsed_ms, 1500);
        assert!(stats.second_pass_ran && stats.cancelled);
    }
}
