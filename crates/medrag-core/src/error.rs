use medrag_llm::LlmError;
use medrag_memory::DocumentId;
use medrag_memory::document::{ChunkingError, DocumentError};
use medrag_memory::vector_store::VectorStoreError;

#[derive(Debug, thiserror::Error)]
pub enum RagError {
    #[error("chunking failed: {0}")]
    Chunking(#[from] ChunkingError),

    #[error("embedding failed: {0}")]
    Embedding(#[source] LlmError),

    #[error("vector store error: {0}")]
    Store(#[source] VectorStoreError),

    #[error("completion failed: {0}")]
    CompletionFailure(#[source] LlmError),

    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    #[error("document {0} not found")]
    NotFound(DocumentId),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<DocumentError> for RagError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::Chunking(e) => Self::Chunking(e),
            DocumentError::Embedding(e) => Self::Embedding(e),
            DocumentError::DimensionMismatch { expected, actual } => {
                Self::Store(VectorStoreError::Dimension { expected, actual })
            }
            DocumentError::Storage(e) => e.into(),
            e @ (DocumentError::EmptyContent
            | DocumentError::Io(_)
            | DocumentError::UnsupportedFormat(_)
            | DocumentError::FileTooLarge(_)) => Self::InvalidRequest(e.to_string()),
        }
    }
}

impl From<VectorStoreError> for RagError {
    fn from(err: VectorStoreError) -> Self {
        match err {
            VectorStoreError::NotFound(id) => Self::NotFound(id),
            e => Self::Store(e),
        }
    }
}
