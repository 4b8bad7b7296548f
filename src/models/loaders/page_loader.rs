//! 带页码标记的文档文本加载
//!
//! 支持三种输入：
//! - `--- Page 3 ---` 或 `[Page 3]` 独占一行的页码标记
//! - 换页符 `\x0c` 分隔（页码从 1 开始）
//! - JSON 数组 `[{"page": 1, "text": "..."}]`

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tokio::fs;
use tracing::warn;

use crate::error::{AppError, AppResult};
use crate::models::document::Page;

fn page_marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| {
        Regex::new(r"(?im)^[ \t]*(?:-{2,}[ \t]*)?\[?[ \t]*page[ \t]+(\d+)[ \t]*\]?[ \t]*(?:-{2,})?[ \t]*$")
            .expect("page marker regex is valid")
    })
}

/// 从文件加载页面
pub async fn load_pages(path: &Path) -> AppResult<Vec<Page>> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| AppError::file(path.display().to_string(), e))?;

    let is_json = path
        .extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let pages = if is_json {
        serde_json::from_str::<Vec<Page>>(&content).map_err(|e| {
            AppError::file(
                path.display().to_string(),
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })?
    } else {
        parse_page_tagged_text(&content)
    };

    tracing::info!(
        "成功加载文档 {}: {} 页",
        path.file_name().unwrap_or_default().to_string_lossy(),
        pages.len()
    );

    Ok(pages)
}

/// 解析带页码标记的纯文本
pub fn parse_page_tagged_text(content: &str) -> Vec<Page> {
    let markers: Vec<_> = page_marker().captures_iter(content).collect();

    if markers.is_empty() {
        return split_by_form_feed(content);
    }

    let mut pages = Vec::with_capacity(markers.len());

    let preamble_end = markers[0].get(0).map(|m| m.start()).unwrap_or(0);
    let preamble = content[..preamble_end].trim();

    for (i, caps) in markers.iter().enumerate() {
        let (Some(whole), Some(number)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let Ok(page) = number.as_str().parse::<u32>() else {
            warn!("无法解析页码: {}", number.as_str());
            continue;
        };

        let body_end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(content.len());
        let mut text = content[whole.end()..body_end].trim().to_string();

        if i == 0 && !preamble.is_empty() {
            warn!("第一个页码标记之前存在文本，已并入第 {} 页", page);
            text = format!("{}\n{}", preamble, text);
        }

        pages.push(Page::new(page, text));
    }

    pages
}

fn split_by_form_feed(content: &str) -> Vec<Page> {
    if content.trim().is_empty() {
        return Vec::new();
    }

    content
        .split('\x0c')
        .enumerate()
        .map(|(i, text)| Page::new(i as u32 + 1, text.trim()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dash_and_bracket_markers() {
        let text = "--- Page 1 ---\nScope of work.\n\n[Page 2]\nResin: vinyl ester.\n--- page 3 ---\n";
        let pages = parse_page_tagged_text(text);

        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0], Page::new(1, "Scope of work."));
        assert_eq!(pages[1], Page::new(2, "Resin: vinyl ester."));
        assert_eq!(pages[2], Page::new(3, ""));
    }

    #[test]
    fn test_inline_page_mention_is_not_a_marker() {
        let text = "[Page 1]\nSee page 4 for details.\n[Page 2]\nEnd.";
        let pages = parse_page_tagged_text(text);
        assert_eq!(pages.len(), 2);
        assert!(pages[0].text.contains("See page 4"));
    }

    #[test]
    fn test_preamble_merged_into_first_page() {
        let pages = parse_page_tagged_text("Title\n[Page 1]\nBody");
        assert_eq!(pages[0].text, "Title\nBody");
    }

    #[test]
    fn test_form_feed_fallback() {
        let pages = parse_page_tagged_text("one\x0ctwo\x0c three ");
        assert_eq!(
            pages,
            vec![Page::new(1, "one"), Page::new(2, "two"), Page::new(3, "three")]
        );
        assert!(parse_page_tagged_text("   ").is_empty());
    }
}
