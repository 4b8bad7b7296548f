pub mod page_loader;
pub mod question_loader;

pub use page_loader::{load_pages, parse_page_tagged_text};
pub use question_loader::{load_question_set, parse_question_set, QuestionSetFormat};
