//! 窗口处理上下文
//!
//! 封装"我正在处理第几轮的第几个窗口"这一信息

use std::fmt::Display;

use crate::models::answer::Pass;
use crate::models::document::DocumentWindow;

/// 窗口处理上下文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowCtx {
    pub pass: Pass,

    /// 从 0 开始
    pub window_index: usize,

    pub total_windows: usize,

    /// 页码范围，仅用于日志
    pub page_label: String,
}

impl WindowCtx {
    pub fn new(pass: Pass, window: &DocumentWindow) -> Self {
        Self {
            pass,
            window_index: window.index,
            total_windows: window.total_windows,
            page_label: window.page_label(),
        }
    }
}

impl Display for WindowCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[窗口 {}/{} {} 页 {}]",
            self.window_index + 1,
            self.total_windows,
            self.pass,
            self.page_label
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let window = DocumentWindow {
            index: 1,
            pages: vec![4, 5, 6],
            text: String::new(),
            total_windows: 3,
            has_evidence: true,
        };
        assert_eq!(
            WindowCtx::new(Pass::First, &window).to_string(),
            "[窗口 2/3 第1轮 页 4-6]"
        );
    }
}
