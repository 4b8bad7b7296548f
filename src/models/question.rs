use serde::{Deserialize, Serialize};

/// 单个问题，加载后不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub section_id: String,
    pub text: String,
    #[serde(default)]
    pub required: bool,
}

/// 章节：拥有一组有序问题，每个启用的章节对应一个专家
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub questions: Vec<Question>,
}

/// 问题集，每次分析创建一次，之后只读
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionSet {
    pub sections: Vec<Section>,
}

impl QuestionSet {
    pub fn new(sections: Vec<Section>) -> Self {
        Self { sections }
    }

    /// 启用的章节（保持原有顺序）
    pub fn enabled_sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter().filter(|s| s.enabled)
    }

    pub fn section(&self, section_id: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == section_id)
    }

    /// 所有问题，含禁用章节
    pub fn questions(&self) -> impl Iterator<Item = &Question> {
        self.sections.iter().flat_map(|s| s.questions.iter())
    }

    /// 启用章节中的问题
    pub fn enabled_questions(&self) -> impl Iterator<Item = &Question> {
        self.enabled_sections().flat_map(|s| s.questions.iter())
    }

    pub fn question(&self, question_id: &str) -> Option<&Question> {
        self.questions().find(|q| q.id == question_id)
    }

    /// 问题是否属于启用的章节
    pub fn is_enabled_question(&self, question_id: &str) -> bool {
        self.enabled_questions().any(|q| q.id == question_id)
    }

    pub fn total_questions(&self) -> usize {
        self.sections.iter().map(|s| s.questions.len()).sum()
    }

    pub fn enabled_question_count(&self) -> usize {
        self.enabled_sections().map(|s| s.questions.len()).sum()
    }
}
