//! HTTP API for documents, search and ask with bearer auth and health endpoint.

mod error;
mod extract;
mod handlers;
mod identity;
mod router;
mod server;

pub use error::GatewayError;
pub use server::GatewayServer;
