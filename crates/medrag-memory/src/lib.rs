//! Documents, chunking, ingestion and access-filtered vector search.

pub mod access;
pub mod document;
pub mod in_memory_store;
pub mod postgres;
pub mod tokens;
pub mod types;
pub mod vector_store;

pub use access::{AccessPolicy, RolePolicy};
pub use in_memory_store::InMemoryVectorStore;
pub use postgres::PgVectorStore;
pub use tokens::estimate_tokens;
pub use types::{Caller, CallerRole, DocumentId, UserId};
pub use vector_store::{VectorStore, VectorStoreError};
