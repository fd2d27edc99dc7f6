//! LLM provider abstraction and summarization support.

pub mod compatible;
pub mod error;
pub mod http;
#[cfg(feature = "mock")]
pub mod mock;
pub mod provider;
pub mod summarize;

pub use compatible::CompatibleProvider;
pub use error::LlmError;
pub use provider::{LlmProvider, Message, Role};
pub use summarize::{LlmSummarizer, Summarizer};
