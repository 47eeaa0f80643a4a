use std::cmp::Ordering;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::access::AccessPolicy;
use crate::document::{
    DocumentPatch, DocumentRecord, EmbeddedChunk, MetadataFilter, NewDocument, StoredDocument,
};
use crate::types::{Caller, DocumentId, UserId};

#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("document {0} not found")]
    NotFound(DocumentId),
    #[error("vector has {actual} dimensions, store expects {expected}")]
    Dimension { expected: usize, actual: usize },
    #[error("integer conversion: {0}")]
    IntConversion(#[from] std::num::TryFromIntError),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Who is searching and which rule decides what they may see.
#[derive(Clone)]
pub struct Visibility {
    pub caller: Caller,
    pub policy: Arc<dyn AccessPolicy>,
}

impl Visibility {
    #[must_use]
    pub fn new(caller: Caller, policy: Arc<dyn AccessPolicy>) -> Self {
        Self { caller, policy }
    }

    #[must_use]
    pub fn allows(&self, record: &DocumentRecord) -> bool {
        self.policy.can_read(&self.caller, record)
    }
}

impl std::fmt::Debug for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Visibility")
            .field("caller", &self.caller)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub vector: Vec<f32>,
    pub filter: MetadataFilter,
    pub visibility: Visibility,
    pub limit: usize,
    /// Minimum cosine similarity; lower-scoring chunks are dropped.
    pub threshold: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub document_id: DocumentId,
    pub document_title: String,
    pub chunk_index: usize,
    pub content: String,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct DocumentQuery {
    pub filter: MetadataFilter,
    pub visibility: Visibility,
    pub skip: usize,
    pub limit: usize,
}

/// Order by descending score, then ascending document id and chunk index.
pub fn rank(hits: &mut [ScoredChunk]) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then(a.document_id.cmp(&b.document_id))
            .then(a.chunk_index.cmp(&b.chunk_index))
    });
}

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait VectorStore: Send + Sync {
    /// Store a document with its full chunk set. Nothing is written on failure.
    fn insert_document(
        &self,
        document: NewDocument,
        created_by: UserId,
        chunks: Vec<EmbeddedChunk>,
    ) -> BoxFuture<'_, Result<DocumentRecord, VectorStoreError>>;

    /// Replace content and the whole chunk set of a document atomically.
    fn replace_chunks(
        &self,
        id: DocumentId,
        content: String,
        chunks: Vec<EmbeddedChunk>,
    ) -> BoxFuture<'_, Result<DocumentRecord, VectorStoreError>>;

    fn update_metadata(
        &self,
        id: DocumentId,
        patch: DocumentPatch,
    ) -> BoxFuture<'_, Result<DocumentRecord, VectorStoreError>>;

    fn get_document(
        &self,
        id: DocumentId,
    ) -> BoxFuture<'_, Result<Option<StoredDocument>, VectorStoreError>>;

    /// Documents visible to the caller that match the filter, ordered by id.
    fn list_documents(
        &self,
        query: DocumentQuery,
    ) -> BoxFuture<'_, Result<Vec<DocumentRecord>, VectorStoreError>>;

    /// Delete a document and its chunks. Returns `false` if it did not exist.
    fn delete_document(&self, id: DocumentId) -> BoxFuture<'_, Result<bool, VectorStoreError>>;

    /// Ranked chunks of visible documents, see [`rank`].
    fn search(
        &self,
        request: SearchRequest,
    ) -> BoxFuture<'_, Result<Vec<ScoredChunk>, VectorStoreError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(doc: i64, chunk: usize, score: f32) -> ScoredChunk {
        ScoredChunk {
            document_id: DocumentId(doc),
            document_title: String::new(),
            chunk_index: chunk,
            content: String::new(),
            score,
        }
    }

    #[test]
    fn rank_orders_by_score_then_ids() {
        let mut hits = vec![
            hit(2, 0, 0.5),
            hit(1, 3, 0.9),
            hit(1, 1, 0.5),
            hit(1, 0, 0.5),
        ];
        rank(&mut hits);
        let order: Vec<(i64, usize)> = hits
            .iter()
            .map(|h| (h.document_id.0, h.chunk_index))
            .collect();
        assert_eq!(order, vec![(1, 3), (1, 0), (1, 1), (2, 0)]);
    }
}
