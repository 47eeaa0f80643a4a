#[derive(Debug, thiserror::Error)]
pub enum ChunkingError {
    #[error("invalid chunking config: {0}")]
    InvalidConfig(String),

    #[error("chunk {index} is ~{tokens} tokens, above the embedding input limit of {limit}")]
    ChunkTooLarge {
        index: usize,
        tokens: usize,
        limit: usize,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("file too large: {0} bytes")]
    FileTooLarge(u64),

    #[error("document content is empty")]
    EmptyContent,

    #[error("chunking failed: {0}")]
    Chunking(#[from] ChunkingError),

    #[error("embedding failed: {0}")]
    Embedding(#[from] medrag_llm::LlmError),

    #[error("embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("storage error: {0}")]
    Storage(#[from] crate::vector_store::VectorStoreError),
}
