use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::Utc;

use crate::document::{DocumentPatch, DocumentRecord, EmbeddedChunk, NewDocument, StoredDocument};
use crate::types::{DocumentId, UserId};
use crate::vector_store::{
    BoxFuture, DocumentQuery, ScoredChunk, SearchRequest, VectorStore, VectorStoreError, rank,
};

struct StoredChunk {
    chunk_index: usize,
    content: String,
    vector: Vec<f32>,
}

struct Entry {
    document: StoredDocument,
    chunks: Vec<StoredChunk>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    documents: BTreeMap<DocumentId, Entry>,
}

/// Process-local store for development and tests.
pub struct InMemoryVectorStore {
    dimensions: usize,
    inner: RwLock<Inner>,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            inner: RwLock::new(Inner::default()),
        }
    }

    fn check_dimensions(&self, chunks: &[EmbeddedChunk]) -> Result<(), VectorStoreError> {
        if let Some(bad) = chunks.iter().find(|c| c.embedding.len() != self.dimensions) {
            return Err(VectorStoreError::Dimension {
                expected: self.dimensions,
                actual: bad.embedding.len(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryVectorStore")
            .field("dimensions", &self.dimensions)
            .finish_non_exhaustive()
    }
}

fn lock_error<T>(e: std::sync::PoisonError<T>) -> VectorStoreError {
    VectorStoreError::Unavailable(e.to_string())
}

fn to_stored(chunks: Vec<EmbeddedChunk>) -> Vec<StoredChunk> {
    chunks
        .into_iter()
        .map(|c| StoredChunk {
            chunk_index: c.chunk.chunk_index,
            content: c.chunk.content,
            vector: c.embedding,
        })
        .collect()
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

impl VectorStore for InMemoryVectorStore {
    fn insert_document(
        &self,
        document: NewDocument,
        created_by: UserId,
        chunks: Vec<EmbeddedChunk>,
    ) -> BoxFuture<'_, Result<DocumentRecord, VectorStoreError>> {
        Box::pin(async move {
            self.check_dimensions(&chunks)?;
            let mut inner = self.inner.write().map_err(lock_error)?;
            inner.next_id += 1;
            let id = DocumentId(inner.next_id);
            let now = Utc::now();
            let record = DocumentRecord {
                id,
                title: document.title,
                document_type: document.document_type,
                department: document.department,
                is_sensitive: document.is_sensitive,
                patient_id: document.patient_id,
                created_by,
                created_at: now,
                updated_at: now,
                chunk_count: chunks.len(),
            };
            inner.documents.insert(
                id,
                Entry {
                    document: StoredDocument {
                        record: record.clone(),
                        content: document.content,
                    },
                    chunks: to_stored(chunks),
                },
            );
            Ok(record)
        })
    }

    fn replace_chunks(
        &self,
        id: DocumentId,
        content: String,
        chunks: Vec<EmbeddedChunk>,
    ) -> BoxFuture<'_, Result<DocumentRecord, VectorStoreError>> {
        Box::pin(async move {
            self.check_dimensions(&chunks)?;
            let mut inner = self.inner.write().map_err(lock_error)?;
            let entry = inner
                .documents
                .get_mut(&id)
                .ok_or(VectorStoreError::NotFound(id))?;
            entry.document.content = content;
            entry.document.record.chunk_count = chunks.len();
            entry.document.record.updated_at = Utc::now();
            entry.chunks = to_stored(chunks);
            Ok(entry.document.record.clone())
        })
    }

    fn update_metadata(
        &self,
        id: DocumentId,
        patch: DocumentPatch,
    ) -> BoxFuture<'_, Result<DocumentRecord, VectorStoreError>> {
        Box::pin(async move {
            let mut inner = self.inner.write().map_err(lock_error)?;
            let entry = inner
                .documents
                .get_mut(&id)
                .ok_or(VectorStoreError::NotFound(id))?;
            patch.apply(&mut entry.document.record);
            entry.document.record.updated_at = Utc::now();
            Ok(entry.document.record.clone())
        })
    }

    fn get_document(
        &self,
        id: DocumentId,
    ) -> BoxFuture<'_, Result<Option<StoredDocument>, VectorStoreError>> {
        Box::pin(async move {
            let inner = self.inner.read().map_err(lock_error)?;
            Ok(inner.documents.get(&id).map(|e| e.document.clone()))
        })
    }

    fn list_documents(
        &self,
        query: DocumentQuery,
    ) -> BoxFuture<'_, Result<Vec<DocumentRecord>, VectorStoreError>> {
        Box::pin(async move {
            let inner = self.inner.read().map_err(lock_error)?;
            Ok(inner
                .documents
                .values()
                .map(|e| &e.document.record)
                .filter(|r| query.filter.matches(r) && query.visibility.allows(r))
                .skip(query.skip)
                .take(query.limit)
                .cloned()
                .collect())
        })
    }

    fn delete_document(&self, id: DocumentId) -> BoxFuture<'_, Result<bool, VectorStoreError>> {
        Box::pin(async move {
            let mut inner = self.inner.write().map_err(lock_error)?;
            Ok(inner.documents.remove(&id).is_some())
        })
    }

    fn search(
        &self,
        request: SearchRequest,
    ) -> BoxFuture<'_, Result<Vec<ScoredChunk>, VectorStoreError>> {
        Box::pin(async move {
            if request.vector.len() != self.dimensions {
                return Err(VectorStoreError::Dimension {
                    expected: self.dimensions,
                    actual: request.vector.len(),
                });
            }
            let inner = self.inner.read().map_err(lock_error)?;
            let query = &request.vector;

            let mut scored: Vec<ScoredChunk> = inner
                .documents
                .values()
                .filter(|e| {
                    let record = &e.document.record;
                    request.filter.matches(record) && request.visibility.allows(record)
                })
                .flat_map(|e| {
                    e.chunks.iter().map(move |c| ScoredChunk {
                        document_id: e.document.record.id,
                        document_title: e.document.record.title.clone(),
                        chunk_index: c.chunk_index,
                        content: c.content.clone(),
                        score: cosine_similarity(query, &c.vector),
                    })
                })
                .filter(|hit| hit.score >= request.threshold)
                .collect();

            rank(&mut scored);
            scored.truncate(request.limit);
            Ok(scored)
        })
    }
}
