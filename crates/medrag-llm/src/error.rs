use std::time::Duration;

use crate::retry::{Classify, RetryClass};

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("rate limited by {provider}")]
    RateLimited {
        provider: &'static str,
        retry_after: Option<Duration>,
    },

    #[error("{provider} rejected credentials (status {status})")]
    Auth { provider: &'static str, status: u16 },

    #[error("transient network error: {0}")]
    Transient(String),

    #[error("embedding count mismatch: sent {expected} inputs, received {received} vectors")]
    EmbeddingMismatch { expected: usize, received: usize },

    #[error("empty response from {provider}")]
    EmptyResponse { provider: &'static str },

    #[error("{0}")]
    Other(String),
}

impl LlmError {
    /// Map a transport-level `reqwest` failure onto the provider error taxonomy.
    ///
    /// Timeouts and connection failures are transient; everything else is kept
    /// as a plain HTTP error and surfaces immediately.
    #[must_use]
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            Self::Transient(err.to_string())
        } else {
            Self::Http(err)
        }
    }
}

impl Classify for LlmError {
    fn classify(&self) -> RetryClass {
        match self {
            Self::RateLimited { retry_after, .. } => RetryClass::Retry {
                after: *retry_after,
            },
            Self::Transient(_) => RetryClass::Retry { after: None },
            _ => RetryClass::Fatal,
        }
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_is_retryable_with_hint() {
        let err = LlmError::RateLimited {
            provider: "openai",
            retry_after: Some(Duration::from_secs(2)),
        };
        assert_eq!(
            err.classify(),
            RetryClass::Retry {
                after: Some(Duration::from_secs(2))
            }
        );
    }

    #[test]
    fn transient_is_retryable() {
        let err = LlmError::Transient("connection reset".into());
        assert_eq!(err.classify(), RetryClass::Retry { after: None });
    }

    #[test]
    fn auth_and_mismatch_are_fatal() {
        let auth = LlmError::Auth {
            provider: "openai",
            status: 401,
        };
        let mismatch = LlmError::EmbeddingMismatch {
            expected: 3,
            received: 2,
        };
        assert_eq!(auth.classify(), RetryClass::Fatal);
        assert_eq!(mismatch.classify(), RetryClass::Fatal);
    }

    #[test]
    fn mismatch_message_names_both_counts() {
        let err = LlmError::EmbeddingMismatch {
            expected: 4,
            received: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains("sent 4"));
        assert!(msg.contains("received 1"));
    }
}
