pub mod window_ctx;
pub mod window_flow;

pub use window_ctx::WindowCtx;
pub use window_flow::{PassSpec, WindowFlow, WindowOutcome, WindowSummary};
