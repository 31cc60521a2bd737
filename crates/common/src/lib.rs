//! RagForge Common Library
//!
//! Shared code for the RagForge retrieval services including:
//! - Database models, the document store trait and its backends
//! - Embedding client abstraction
//! - Vector index adapter with mandatory tenant filtering
//! - Session event relay
//! - Error types and handling
//! - Configuration management
//! - Tenant context extraction
//! - Metrics and observability

pub mod auth;
pub mod config;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod events;
pub mod metrics;
pub mod vector;

// Re-export commonly used types
pub use auth::TenantContext;
pub use config::AppConfig;
pub use db::{DocumentStore, InMemoryDocumentStore, Repository};
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use events::EventRelay;
pub use vector::VectorIndex;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;
