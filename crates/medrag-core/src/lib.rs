//! Retrieval-augmented question answering over healthcare documents.

pub mod assembler;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod prompt;
pub mod retriever;
pub mod secret;
pub mod service;
pub mod types;

pub use config::Config;
pub use error::RagError;
pub use orchestrator::{AskProgress, AskStage, CompletionConfig, CompletionOrchestrator};
pub use retriever::{RetrievalConfig, Retriever};
pub use service::RagService;
pub use types::{Answer, IngestReport, SearchResult};
