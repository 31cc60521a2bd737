//! RagForge search
//!
//! Tenant-scoped retrieval over ingested chunks:
//! - Vector similarity search through the external index
//! - Lexical search (Postgres full-text, or in-memory BM25)
//! - Hybrid search with weighted Reciprocal Rank Fusion
//! - Prompt context rendering

pub mod retrieval;

pub use retrieval::{
    render_context, HybridSearchEngine, HybridSearchOptions, InMemoryLexicalSearch, LexicalHit, LexicalSearch,
    PostgresLexicalSearch, RRFusion, SearchResult, SearchSource, VectorRetriever,
};
