use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// 文本抽取子系统给出的一页文本
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    #[serde(alias = "page_number")]
    pub page: u32,
    pub text: String,
}

impl Page {
    pub fn new(page: u32, text: impl Into<String>) -> Self {
        Self {
            page,
            text: text.into(),
        }
    }
}

/// 文档窗口：连续若干页的切片，作为一次模型输入的单位
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentWindow {
    /// 从 0 开始
    pub index: usize,
    pub pages: Vec<u32>,
    pub text: String,
    pub total_windows: usize,
    pub has_evidence: bool,
}

impl DocumentWindow {
    pub fn first_page(&self) -> Option<u32> {
        self.pages.first().copied()
    }

    pub fn last_page(&self) -> Option<u32> {
        self.pages.last().copied()
    }

    pub fn contains_page(&self, page: u32) -> bool {
        self.pages.contains(&page)
    }

    /// 用于日志和提示词的页码范围，例如 `4-6`
    pub fn page_label(&self) -> String {
        match (self.first_page(), self.last_page()) {
            (Some(first), Some(last)) if first == last => first.to_string(),
            (Some(first), Some(last)) => format!("{}-{}", first, last),
            _ => "-".to_string(),
        }
    }

    /// 取窗口文本；空窗口返回 `ExtractionEmpty`
    pub fn evidence(&self) -> AppResult<&str> {
        if self.has_evidence {
            Ok(&self.text)
        } else {
            Err(AppError::ExtractionEmpty {
                window_index: self.index,
                pages: self.pages.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_label() {
        let window = DocumentWindow {
            index: 1,
            pages: vec![4, 5, 6],
            text: "[Page 4]\nfoo".into(),
            total_windows: 3,
            has_evidence: true,
        };
        assert_eq!(window.page_label(), "4-6");
        assert!(window.contains_page(5));
        assert!(window.evidence().is_ok());

        let single = DocumentWindow {
            pages: vec![7],
            has_evidence: false,
            ..window
        };
        assert_eq!(single.page_label(), "7");
        assert!(matches!(
            single.evidence(),
            Err(AppError::ExtractionEmpty { window_index: 1, .. })
        ));
    }
}
