use std::sync::Arc;
use std::time::Duration;

use medrag_llm::provider::LlmProvider;
use medrag_llm::with_timeout;

use super::splitter::{TextSplitter, clean_text};
use super::types::{DocumentRecord, EmbeddedChunk, NewDocument};
use super::DocumentError;
use crate::types::{DocumentId, UserId};
use crate::vector_store::VectorStore;

/// Chunk, embed and store documents. A document's chunk set is written in a
/// single store call, so a failed embedding leaves nothing behind.
pub struct IngestionPipeline<P> {
    splitter: TextSplitter,
    provider: Arc<P>,
    store: Arc<dyn VectorStore>,
    dimensions: usize,
    embed_timeout: Duration,
}

impl<P: LlmProvider> IngestionPipeline<P> {
    #[must_use]
    pub fn new(
        splitter: TextSplitter,
        provider: Arc<P>,
        store: Arc<dyn VectorStore>,
        dimensions: usize,
        embed_timeout: Duration,
    ) -> Self {
        Self {
            splitter,
            provider,
            store,
            dimensions,
            embed_timeout,
        }
    }

    /// Split and embed `content` without touching the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is empty, chunking fails, the provider
    /// fails or returns vectors of the wrong size.
    pub async fn prepare(&self, content: &str) -> Result<Vec<EmbeddedChunk>, DocumentError> {
        if content.trim().is_empty() {
            return Err(DocumentError::EmptyContent);
        }
        let chunks = self.splitter.split(content)?;
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();

        let vectors = with_timeout(
            "embed_batch",
            self.embed_timeout,
            self.provider.embed_batch(&texts),
        )
        .await?;
        if vectors.len() != chunks.len() {
            return Err(medrag_llm::LlmError::EmbeddingMismatch {
                expected: chunks.len(),
                received: vectors.len(),
            }
            .into());
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimensions) {
            return Err(DocumentError::DimensionMismatch {
                expected: self.dimensions,
                actual: bad.len(),
            });
        }

        Ok(chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, embedding)| EmbeddedChunk { chunk, embedding })
            .collect())
    }

    /// Ingest a new document: clean -> split -> embed -> store.
    ///
    /// # Errors
    ///
    /// Returns an error if preparation or the store write fails.
    pub async fn ingest(
        &self,
        mut document: NewDocument,
        created_by: UserId,
    ) -> Result<DocumentRecord, DocumentError> {
        document.content = clean_text(&document.content);
        let chunks = self.prepare(&document.content).await?;
        let count = chunks.len();
        let record = self
            .store
            .insert_document(document, created_by, chunks)
            .await?;
        tracing::info!(document_id = %record.id, chunks = count, "document ingested");
        Ok(record)
    }

    /// Replace a document's content and regenerate its chunk set wholesale.
    ///
    /// # Errors
    ///
    /// Returns an error if preparation fails or the document no longer exists.
    pub async fn reingest(
        &self,
        id: DocumentId,
        content: &str,
    ) -> Result<DocumentRecord, DocumentError> {
        let content = clean_text(content);
        let chunks = self.prepare(&content).await?;
        let count = chunks.len();
        let record = self.store.replace_chunks(id, content, chunks).await?;
        tracing::info!(document_id = %id, chunks = count, "document re-chunked");
        Ok(record)
    }
}
