//! 引用页码校验与修复
//!
//! 每条答案必须至少引用一页。模型给出的页码只保留落在当前窗口内的部分；
//! 一页都不剩时尝试从答案文本里的 "page 5"、"p. 5"、"[Page 5]" 提取，
//! 仍然没有则丢弃该答案。

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::models::document::DocumentWindow;

/// 区间引用（如 "pages 4-60"）最多展开的页数
const MAX_RANGE_SPAN: u32 = 50;

fn page_mention() -> &'static Regex {
    static MENTION: OnceLock<Regex> = OnceLock::new();
    MENTION.get_or_init(|| {
        Regex::new(r"(?i)(?:\bpages?|\bpp?\.)\s*(\d+)(?:\s*(-|–|to|and|,|&)\s*(\d+))?")
            .expect("page mention regex is valid")
    })
}

/// 校验结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CitationCheck {
    /// 模型给出的页码有效（可能已剔除窗口外页码）
    Valid(BTreeSet<u32>),
    /// 从答案文本中修复出的页码
    Repaired(BTreeSet<u32>),
    /// 无法得到任何有效页码
    Missing,
}

/// 提取文本中提到的所有页码
pub fn extract_page_mentions(text: &str) -> BTreeSet<u32> {
    let mut pages = BTreeSet::new();

    for caps in page_mention().captures_iter(text) {
        let Some(start) = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok()) else {
            continue;
        };
        pages.insert(start);

        if let Some(end) = caps.get(3).and_then(|m| m.as_str().parse::<u32>().ok()) {
            let is_range = caps
                .get(2)
                .is_some_and(|sep| matches!(sep.as_str().to_lowercase().as_str(), "-" | "–" | "to"));
            if is_range && end >= start && end - start <= MAX_RANGE_SPAN {
                pages.extend(start..=end);
            } else {
                pages.insert(end);
            }
        }
    }

    pages
}

/// 校验并在必要时修复答案的引用页码
pub fn check_citations(cited: &BTreeSet<u32>, answer_text: &str, window: &DocumentWindow) -> CitationCheck {
    let in_window: BTreeSet<u32> = cited
        .iter()
        .copied()
        .filter(|p| window.contains_page(*p))
        .collect();

    if !in_window.is_empty() {
        return CitationCheck::Valid(in_window);
    }

    let repaired: BTreeSet<u32> = extract_page_mentions(answer_text)
        .into_iter()
        .filter(|p| window.contains_page(*p))
        .collect();

    if repaired.is_empty() {
        CitationCheck::Missing
    } else {
        CitationCheck::Repaired(repaired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(pages: Vec<u32>) -> DocumentWindow {
        DocumentWindow {
            index: 1,
            pages,
            text: String::new(),
            total_windows: 3,
            has_evidence: true,
        }
    }

    #[test]
    fn test_extract_page_mentions() {
        assert_eq!(extract_page_mentions("see page 5"), BTreeSet::from([5]));
        assert_eq!(extract_page_mentions("per p. 12 and [Page 4]"), BTreeSet::from([4, 12]));
        assert_eq!(extract_page_mentions("pp. 4-6"), BTreeSet::from([4, 5, 6]));
        assert_eq!(extract_page_mentions("Pages 7 and 9"), BTreeSet::from([7, 9]));
        assert_eq!(extract_page_mentions("pages 2 to 3"), BTreeSet::from([2, 3]));
        assert!(extract_page_mentions("6 mm thickness, type II").is_empty());
    }

    #[test]
    fn test_valid_citations_filtered_to_window() {
        let w = window(vec![4, 5, 6]);
        let cited = BTreeSet::from([5, 40]);
        assert_eq!(check_citations(&cited, "", &w), CitationCheck::Valid(BTreeSet::from([5])));
    }

    #[test]
    fn test_repair_from_answer_text() {
        let w = window(vec![4, 5, 6]);
        assert_eq!(
            check_citations(&BTreeSet::new(), "Vinyl ester resin (page 6)", &w),
            CitationCheck::Repaired(BTreeSet::from([6]))
        );
        // 文本里提到的页不在窗口内，无法修复
        assert_eq!(
            check_citations(&BTreeSet::from([99]), "see page 12", &w),
            CitationCheck::Missing
        );
    }
}
