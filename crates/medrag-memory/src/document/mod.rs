pub mod error;
pub mod loader;
pub mod pipeline;
pub mod splitter;
pub mod types;

pub use error::{ChunkingError, DocumentError};
pub use loader::{LoadedText, TextLoader};
pub use pipeline::IngestionPipeline;
pub use splitter::{SplitterConfig, TextSplitter};
pub use types::{
    Chunk, DocumentPatch, DocumentRecord, EmbeddedChunk, MetadataFilter, NewDocument,
    StoredDocument,
};
