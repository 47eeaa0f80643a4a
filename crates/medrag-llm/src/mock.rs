//! Test-only mock provider.
//!
//! Embeddings are a deterministic hashed bag-of-words, so texts sharing words
//! land close together under cosine similarity.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::LlmError;
use crate::provider::{LlmProvider, Message};

/// Failure the mock should produce instead of a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    RateLimited,
    Auth,
    Transient,
    /// Return one vector fewer than requested.
    ShortBatch,
}

impl MockFailure {
    fn to_error(self, expected: usize) -> LlmError {
        match self {
            Self::RateLimited => LlmError::RateLimited {
                provider: "mock",
                retry_after: None,
            },
            Self::Auth => LlmError::Auth {
                provider: "mock",
                status: 401,
            },
            Self::Transient => LlmError::Transient("mock transient failure".into()),
            Self::ShortBatch => LlmError::EmbeddingMismatch {
                expected,
                received: expected.saturating_sub(1),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<String>>>,
    pub default_response: String,
    pub dimensions: usize,
    pub chat_failure: Option<MockFailure>,
    pub embed_failure: Option<MockFailure>,
    /// Milliseconds to sleep before answering any call.
    pub delay_ms: u64,
    chat_calls: Arc<AtomicUsize>,
    embed_calls: Arc<AtomicUsize>,
    last_messages: Arc<Mutex<Vec<Message>>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            default_response: "mock response".into(),
            dimensions: 64,
            chat_failure: None,
            embed_failure: None,
            delay_ms: 0,
            chat_calls: Arc::new(AtomicUsize::new(0)),
            embed_calls: Arc::new(AtomicUsize::new(0)),
            last_messages: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    #[must_use]
    pub fn failing_chat(mut self, failure: MockFailure) -> Self {
        self.chat_failure = Some(failure);
        self
    }

    #[must_use]
    pub fn failing_embed(mut self, failure: MockFailure) -> Self {
        self.embed_failure = Some(failure);
        self
    }

    #[must_use]
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    #[must_use]
    pub fn chat_calls(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    /// Messages passed to the most recent `chat` call.
    #[must_use]
    pub fn last_messages(&self) -> Vec<Message> {
        self.last_messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Deterministic embedding: each lowercase word is hashed into a bucket.
    #[must_use]
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let dims = self.dimensions.max(1);
        let mut vector = vec![0.0f32; dims];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = fnv1a(&word.to_lowercase()) % dims as u64;
            #[allow(clippy::cast_possible_truncation)]
            {
                vector[bucket as usize] += 1.0;
            }
        }
        vector
    }

    async fn pause(&self) {
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
    }
}

fn fnv1a(s: &str) -> u64 {
    s.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, b| {
        (hash ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
    })
}

impl LlmProvider for MockProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_messages.lock() {
            *last = messages.to_vec();
        }
        self.pause().await;
        if let Some(failure) = self.chat_failure {
            return Err(failure.to_error(1));
        }
        let mut responses = self
            .responses
            .lock()
            .map_err(|e| LlmError::Other(e.to_string()))?;
        if responses.is_empty() {
            Ok(self.default_response.clone())
        } else {
            Ok(responses.remove(0))
        }
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if let Some(failure) = self.embed_failure {
            return Err(failure.to_error(texts.len()));
        }
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }
}
