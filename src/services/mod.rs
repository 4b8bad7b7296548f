pub mod accumulator;
pub mod citation;
pub mod dispatcher;
pub mod persona_cache;
pub mod prompts;
pub mod result_compiler;
pub mod second_pass;
pub mod similarity;
pub mod token_budget;
pub mod windower;

pub use accumulator::{AnswerAccumulator, IngestReport, MergeThresholds};
pub use dispatcher::{ExpertAssignment, ExpertOutcome, MultiExpertDispatcher, WindowDispatch};
pub use persona_cache::{ExpertPersona, ExpertPersonaCache};
pub use result_compiler::{compile, RunMetrics};
pub use second_pass::{SecondPassEnhancer, SecondPassReport};
pub use similarity::{TextSimilarity, WordOverlapSimilarity};
pub use token_budget::{TokenBudgetTracker, UsageSnapshot};
pub use windower::DocumentWindower;
