pub mod llm_client;
pub mod progress;

pub use llm_client::{LanguageModel, ModelResponse, OpenAiModel};
pub use progress::ProgressEmitter;
