//! Embedding and chat-completion provider abstraction.

pub mod any;
pub mod error;
pub mod http;
#[cfg(feature = "mock")]
pub mod mock;
pub mod openai;
pub mod provider;
pub mod retry;

pub use error::LlmError;
pub use provider::LlmProvider;
pub use retry::{RetryPolicy, with_retry, with_timeout};
