pub mod answer;
pub mod document;
pub mod event;
pub mod loaders;
pub mod question;
pub mod result;

pub use answer::{AccumulatedAnswer, AnswerVariant, Pass, RawAnswer, VariantRelation};
pub use document::{DocumentWindow, Page};
pub use event::ProgressEvent;
pub use loaders::{load_pages, load_question_set, parse_page_tagged_text, parse_question_set, QuestionSetFormat};
pub use question::{Question, QuestionSet, Section};
pub use result::{AnalysisResult, AnalysisStatistics, Footnote, QuestionResult, QuestionStatus, SectionResult};
