use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

pub trait LlmProvider: Send + Sync {
    /// Send messages to the completion model and return the assistant response.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails to communicate or the response is invalid.
    fn chat(&self, messages: &[Message]) -> impl Future<Output = Result<String, LlmError>> + Send;

    /// Embed a batch of texts. The output has one vector per input, in input order.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::EmbeddingMismatch`] when the provider returns a different
    /// number of vectors than inputs, or any provider-boundary error.
    fn embed_batch(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>, LlmError>> + Send;

    /// Embed a single text.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`LlmProvider::embed_batch`].
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, LlmError>> + Send {
        async move {
            let vectors = self.embed_batch(&[text.to_owned()]).await?;
            let received = vectors.len();
            match vectors.into_iter().next() {
                Some(v) if received == 1 => Ok(v),
                _ => Err(LlmError::EmbeddingMismatch {
                    expected: 1,
                    received,
                }),
            }
        }
    }

    fn name(&self) -> &str;
}
