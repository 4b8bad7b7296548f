//! 文档窗口划分 - 业务能力层
//!
//! 把按页标记的文本切成连续、无缝、不重叠的页窗口。
//! N 页、步长 S 得到 ⌈N/S⌉ 个窗口，所有窗口的页码并集等于全部页码。

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::error::{AppResult, ConfigError};
use crate::models::document::{DocumentWindow, Page};

/// 文档窗口划分器
///
/// 窗口只生成一次，两轮分析都复用同一组窗口。
#[derive(Debug, Clone)]
pub struct DocumentWindower {
    windows: Vec<DocumentWindow>,
}

impl DocumentWindower {
    /// 按页码排序后每 `stride` 页切一个窗口；重复页码的文本会拼接到同一页
    pub fn new(pages: Vec<Page>, stride: usize) -> AppResult<Self> {
        if stride == 0 {
            return Err(ConfigError::OutOfRange {
                field: "window_stride",
                value: stride.to_string(),
                expected: "至少为 1",
            }
            .into());
        }

        let mut merged: BTreeMap<u32, String> = BTreeMap::new();
        for page in pages {
            let entry = merged.entry(page.page).or_default();
            if !entry.is_empty() && !page.text.trim().is_empty() {
                entry.push('\n');
            }
            entry.push_str(page.text.trim());
        }

        let ordered: Vec<(u32, String)> = merged.into_iter().collect();
        let total_windows = ordered.len().div_ceil(stride);

        let windows = ordered
            .chunks(stride)
            .enumerate()
            .map(|(index, chunk)| build_window(index, chunk, total_windows))
            .collect();

        Ok(Self { windows })
    }

    pub fn windows(&self) -> Windows<'_> {
        Windows {
            inner: self.windows.iter(),
        }
    }

    pub fn as_slice(&self) -> &[DocumentWindow] {
        &self.windows
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// 有可用文本的窗口数量
    pub fn evidence_window_count(&self) -> usize {
        self.windows.iter().filter(|w| w.has_evidence).count()
    }
}

/// 可重启的窗口序列，clone 即可从头再遍历
#[derive(Debug, Clone)]
pub struct Windows<'a> {
    inner: std::slice::Iter<'a, DocumentWindow>,
}

impl<'a> Iterator for Windows<'a> {
    type Item = &'a DocumentWindow;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Windows<'_> {}

fn build_window(index: usize, chunk: &[(u32, String)], total_windows: usize) -> DocumentWindow {
    let mut text = String::new();
    for (page, body) in chunk {
        if !text.is_empty() {
            text.push_str("\n\n");
        }
        let _ = write!(text, "[Page {}]\n{}", page, body);
    }

    DocumentWindow {
        index,
        pages: chunk.iter().map(|(page, _)| *page).collect(),
        text,
        total_windows,
        has_evidence: chunk.iter().any(|(_, body)| !body.trim().is_empty()),
    }
}
