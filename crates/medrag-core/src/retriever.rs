use std::sync::Arc;
use std::time::Duration;

use medrag_llm::provider::LlmProvider;
use medrag_llm::with_timeout;
use medrag_memory::document::MetadataFilter;
use medrag_memory::vector_store::{ScoredChunk, SearchRequest, VectorStore, Visibility};
use medrag_memory::{AccessPolicy, Caller, VectorStoreError, estimate_tokens};

use crate::error::RagError;

/// Upper bound on results a caller may request in one search.
pub const MAX_RESULTS_LIMIT: usize = 100;

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub similarity_threshold: f32,
    /// Used when the caller does not ask for a specific number of results.
    pub max_results: usize,
    pub max_context_tokens: usize,
    pub embedding_dimensions: usize,
    /// Token limit of the embedding model; longer queries are rejected.
    pub max_input_tokens: usize,
    pub embed_timeout: Duration,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.3,
            max_results: 5,
            max_context_tokens: 8000,
            embedding_dimensions: 1536,
            max_input_tokens: 8191,
            embed_timeout: Duration::from_secs(30),
        }
    }
}

/// Query embedding plus access-filtered vector search.
pub struct Retriever<P> {
    provider: Arc<P>,
    store: Arc<dyn VectorStore>,
    policy: Arc<dyn AccessPolicy>,
    config: RetrievalConfig,
}

impl<P: LlmProvider> Retriever<P> {
    #[must_use]
    pub fn new(
        provider: Arc<P>,
        store: Arc<dyn VectorStore>,
        policy: Arc<dyn AccessPolicy>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            provider,
            store,
            policy,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// # Errors
    ///
    /// Returns [`RagError::InvalidRequest`] if the query exceeds the embedding
    /// model's input limit, [`RagError::Embedding`] if the provider fails or
    /// times out, and [`RagError::Store`] if the vector has the wrong
    /// dimensionality.
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>, RagError> {
        let tokens = estimate_tokens(query);
        if tokens > self.config.max_input_tokens {
            return Err(RagError::InvalidRequest(format!(
                "query is too long: {tokens} tokens, limit is {}",
                self.config.max_input_tokens
            )));
        }
        let vector = with_timeout(
            "embed_query",
            self.config.embed_timeout,
            self.provider.embed(query),
        )
        .await
        .map_err(RagError::Embedding)?;
        if vector.len() != self.config.embedding_dimensions {
            return Err(RagError::Store(VectorStoreError::Dimension {
                expected: self.config.embedding_dimensions,
                actual: vector.len(),
            }));
        }
        Ok(vector)
    }

    /// Ranked chunks visible to `caller` that score at least the threshold.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Store`] if the store query fails.
    pub async fn retrieve(
        &self,
        caller: &Caller,
        vector: Vec<f32>,
        filter: MetadataFilter,
        limit: Option<usize>,
    ) -> Result<Vec<ScoredChunk>, RagError> {
        let limit = limit
            .unwrap_or(self.config.max_results)
            .clamp(1, MAX_RESULTS_LIMIT);
        let hits = self
            .store
            .search(SearchRequest {
                vector,
                filter,
                visibility: Visibility::new(caller.clone(), Arc::clone(&self.policy)),
                limit,
                threshold: self.config.similarity_threshold,
            })
            .await?;
        tracing::debug!(
            user_id = %caller.user_id,
            hits = hits.len(),
            limit,
            "vector search finished"
        );
        Ok(hits)
    }

    /// Embed `query` and retrieve.
    ///
    /// # Errors
    ///
    /// See [`Retriever::embed_query`] and [`Retriever::retrieve`].
    pub async fn search(
        &self,
        caller: &Caller,
        query: &str,
        filter: MetadataFilter,
        limit: Option<usize>,
    ) -> Result<Vec<ScoredChunk>, RagError> {
        let vector = self.embed_query(query).await?;
        self.retrieve(caller, vector, filter, limit).await
    }
}
