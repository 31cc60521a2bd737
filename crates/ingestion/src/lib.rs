//! RagForge ingestion
//!
//! Turns an uploaded document into searchable chunks:
//! - `chunker`: overlapping token-bounded segments
//! - `pipeline`: chunk → embed → persist → index, plus delete and reconcile

pub mod chunker;
pub mod pipeline;

pub use chunker::{chunk_text, ChunkingConfig, TextChunk};
pub use pipeline::{CleanupReport, IngestionPipeline, IngestionReport};
