//! Text-generation providers used for environmental assessments.

pub mod http;
pub mod provider;

pub use provider::{CompletionRequest, CompletionResponse, LlmError, LlmProvider};
