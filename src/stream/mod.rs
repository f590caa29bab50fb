pub mod listener;
pub mod sse;

pub use listener::{listen_events, wait_for_completion, CompletionResult};
pub use sse::DataLineParser;
