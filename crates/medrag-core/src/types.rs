//! Result types returned by [`crate::RagService`] and serialized by the gateway.

use medrag_memory::DocumentId;
use medrag_memory::document::DocumentRecord;
use medrag_memory::vector_store::ScoredChunk;
use serde::{Deserialize, Serialize};

/// One ranked chunk as presented to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub document_id: DocumentId,
    pub chunk_excerpt: String,
    pub document_title: String,
    /// Cosine similarity clamped to `[0, 1]`.
    pub similarity: f32,
    pub chunk_index: usize,
}

impl From<ScoredChunk> for SearchResult {
    fn from(hit: ScoredChunk) -> Self {
        Self {
            document_id: hit.document_id,
            chunk_excerpt: hit.content,
            document_title: hit.document_title,
            similarity: hit.score.clamp(0.0, 1.0),
            chunk_index: hit.chunk_index,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub response: String,
    /// The context entries the answer was grounded on, in rank order.
    pub sources: Vec<SearchResult>,
    pub token_count: usize,
    pub context_used: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub document_id: DocumentId,
    pub chunk_count: usize,
    pub document: DocumentRecord,
}

impl From<DocumentRecord> for IngestReport {
    fn from(document: DocumentRecord) -> Self {
        Self {
            document_id: document.id,
            chunk_count: document.chunk_count,
            document,
        }
    }
}
