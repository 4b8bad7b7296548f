//! 问题集加载与校验
//!
//! 配置结构（TOML 或 JSON）：
//!
//! ```toml
//! [[sections]]
//! id = "materials"
//! name = "Materials"
//! enabled = true
//!
//! [[sections.questions]]
//! id = "m1"
//! text = "What resin system is specified?"
//! required = true
//! ```
//!
//! 先反序列化为 `serde_json::Value` 再逐字段校验，
//! 这样类型错误（如 `enabled = "yes"`）能定位到具体章节。

use std::collections::HashSet;
use std::path::Path;

use serde_json::Value;
use tokio::fs;

use crate::error::{AppError, AppResult, ValidationError};
use crate::models::question::{Question, QuestionSet, Section};

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionSetFormat {
    Toml,
    Json,
}

impl QuestionSetFormat {
    /// 按扩展名判断，默认 TOML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|s| s.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => QuestionSetFormat::Json,
            _ => QuestionSetFormat::Toml,
        }
    }
}

/// 从文件加载问题集
pub async fn load_question_set(path: &Path) -> AppResult<QuestionSet> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| AppError::file(path.display().to_string(), e))?;

    let question_set = parse_question_set(&content, QuestionSetFormat::from_path(path))?;

    tracing::info!(
        "成功加载问题集 {}: {} 个章节, {} 个问题 (启用 {})",
        path.file_name().unwrap_or_default().to_string_lossy(),
        question_set.sections.len(),
        question_set.total_questions(),
        question_set.enabled_question_count()
    );

    Ok(question_set)
}

/// 解析并校验问题集
pub fn parse_question_set(
    content: &str,
    format: QuestionSetFormat,
) -> Result<QuestionSet, ValidationError> {
    let root: Value = match format {
        QuestionSetFormat::Toml => {
            toml::from_str(content).map_err(|e| ValidationError::Parse(e.to_string()))?
        }
        QuestionSetFormat::Json => {
            serde_json::from_str(content).map_err(|e| ValidationError::Parse(e.to_string()))?
        }
    };

    let raw_sections = match root.get("sections") {
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(ValidationError::WrongType {
                location: "root".to_string(),
                field: "sections",
                expected: "数组",
            })
        }
        None => return Err(ValidationError::NoSections),
    };

    if raw_sections.is_empty() {
        return Err(ValidationError::NoSections);
    }

    let mut section_ids = HashSet::new();
    let mut question_ids = HashSet::new();
    let mut sections = Vec::with_capacity(raw_sections.len());

    for (section_index, raw_section) in raw_sections.iter().enumerate() {
        let location = format!("sections[{}]", section_index);
        let section = parse_section(raw_section, &location, &mut question_ids)?;

        if !section_ids.insert(section.id.clone()) {
            return Err(ValidationError::DuplicateSectionId(section.id));
        }
        sections.push(section);
    }

    Ok(QuestionSet::new(sections))
}

fn parse_section(
    raw: &Value,
    location: &str,
    question_ids: &mut HashSet<String>,
) -> Result<Section, ValidationError> {
    if !raw.is_object() {
        return Err(ValidationError::WrongType {
            location: location.to_string(),
            field: "section",
            expected: "表/对象",
        });
    }

    let id = required_id(raw, "id", location)?;
    let location = format!("{} (id={})", location, id);

    let name = match raw.get("name") {
        None | Some(Value::Null) => id.clone(),
        Some(Value::String(name)) if name.trim().is_empty() => id.clone(),
        Some(Value::String(name)) => name.trim().to_string(),
        Some(_) => {
            return Err(ValidationError::WrongType {
                location,
                field: "name",
                expected: "字符串",
            })
        }
    };

    let enabled = optional_bool(raw, "enabled", &location)?.unwrap_or(true);

    let raw_questions = match raw.get("questions") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(_) => {
            return Err(ValidationError::WrongType {
                location,
                field: "questions",
                expected: "数组",
            })
        }
    };

    let mut questions = Vec::with_capacity(raw_questions.len());
    for (question_index, raw_question) in raw_questions.iter().enumerate() {
        let question_location = format!("{}.questions[{}]", location, question_index);
        let question = parse_question(raw_question, &id, &question_location)?;

        if !question_ids.insert(question.id.clone()) {
            return Err(ValidationError::DuplicateQuestionId(question.id));
        }
        questions.push(question);
    }

    Ok(Section {
        id,
        name,
        enabled,
        questions,
    })
}

fn parse_question(
    raw: &Value,
    section_id: &str,
    location: &str,
) -> Result<Question, ValidationError> {
    if !raw.is_object() {
        return Err(ValidationError::WrongType {
            location: location.to_string(),
            field: "question",
            expected: "表/对象",
        });
    }

    let id = required_id(raw, "id", location)?;

    let text = match raw.get("text") {
        Some(Value::String(text)) if !text.trim().is_empty() => text.trim().to_string(),
        Some(Value::String(_)) | None | Some(Value::Null) => {
            return Err(ValidationError::MissingField {
                location: location.to_string(),
                field: "text",
            })
        }
        Some(_) => {
            return Err(ValidationError::WrongType {
                location: location.to_string(),
                field: "text",
                expected: "字符串",
            })
        }
    };

    let required = optional_bool(raw, "required", location)?.unwrap_or(false);

    Ok(Question {
        id,
        section_id: section_id.to_string(),
        text,
        required,
    })
}

/// id 可以是字符串或整数，不能为空
fn required_id(raw: &Value, field: &'static str, location: &str) -> Result<String, ValidationError> {
    match raw.get(field) {
        Some(Value::String(id)) if !id.trim().is_empty() => Ok(id.trim().to_string()),
        Some(Value::Number(n)) if n.is_u64() || n.is_i64() => Ok(n.to_string()),
        Some(Value::String(_)) | None | Some(Value::Null) => Err(ValidationError::MissingField {
            location: location.to_string(),
            field,
        }),
        Some(_) => Err(ValidationError::WrongType {
            location: location.to_string(),
            field,
            expected: "字符串或整数",
        }),
    }
}

fn optional_bool(
    raw: &Value,
    field: &'static str,
    location: &str,
) -> Result<Option<bool>, ValidationError> {
    match raw.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(ValidationError::WrongType {
            location: location.to_string(),
            field,
            expected: "布尔值",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_TOML: &str = r#"
[[sections]]
id = "materials"
name = "Materials"
enabled = true

[[sections.questions]]
id = "m1"
text = "What resin system is specified?"
required = true

[[sections.questions]]
id = "m2"
text = "What is the liner thickness?"

[[sections]]
id = "safety"
enabled = false

[[sections.questions]]
id = "s1"
text = "Is confined space entry required?"
"#;

    #[test]
    fn test_parse_valid_toml() {
        let set = parse_question_set(VALID_TOML, QuestionSetFormat::Toml).unwrap();

        assert_eq!(set.sections.len(), 2);
        assert_eq!(set.sections[0].name, "Materials");
        assert!(set.sections[0].questions[0].required);
        assert!(!set.sections[0].questions[1].required);
        assert_eq!(set.sections[0].questions[1].section_id, "materials");
        // name 缺省时回退为 id
        assert_eq!(set.sections[1].name, "safety");
        assert!(!set.sections[1].enabled);
    }

    #[test]
    fn test_parse_valid_json_with_numeric_ids() {
        let json = r#"{"sections":[{"id":1,"name":"General","questions":[{"id":10,"text":"Project name?"}]}]}"#;
        let set = parse_question_set(json, QuestionSetFormat::Json).unwrap();

        assert_eq!(set.sections[0].id, "1");
        assert!(set.sections[0].enabled);
        assert_eq!(set.sections[0].questions[0].id, "10");
    }

    #[test]
    fn test_missing_question_id() {
        let json = r#"{"sections":[{"id":"a","questions":[{"text":"no id"}]}]}"#;
        let err = parse_question_set(json, QuestionSetFormat::Json).unwrap_err();
        assert!(matches!(err, ValidationError::MissingField { field: "id", .. }));
    }

    #[test]
    fn test_duplicate_ids() {
        let json = r#"{"sections":[
            {"id":"a","questions":[{"id":"q1","text":"x"}]},
            {"id":"b","questions":[{"id":"q1","text":"y"}]}
        ]}"#;
        assert_eq!(
            parse_question_set(json, QuestionSetFormat::Json).unwrap_err(),
            ValidationError::DuplicateQuestionId("q1".into())
        );

        let json = r#"{"sections":[{"id":"a"},{"id":"a"}]}"#;
        assert_eq!(
            parse_question_set(json, QuestionSetFormat::Json).unwrap_err(),
            ValidationError::DuplicateSectionId("a".into())
        );
    }

    #[test]
    fn test_non_boolean_enabled_flag() {
        let toml = r#"
[[sections]]
id = "a"
enabled = "yes"
"#;
        let err = parse_question_set(toml, QuestionSetFormat::Toml).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::WrongType {
                field: "enabled",
                ..
            }
        ));
    }

    #[test]
    fn test_empty_and_unparseable_input() {
        assert_eq!(
            parse_question_set(r#"{"sections":[]}"#, QuestionSetFormat::Json).unwrap_err(),
            ValidationError::NoSections
        );
        assert!(matches!(
            parse_question_set("[[sections]", QuestionSetFormat::Toml).unwrap_err(),
            ValidationError::Parse(_)
        ));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            QuestionSetFormat::from_path(Path::new("q.JSON")),
            QuestionSetFormat::Json
        );
        assert_eq!(
            QuestionSetFormat::from_path(Path::new("q.toml")),
            QuestionSetFormat::Toml
        );
    }
}
