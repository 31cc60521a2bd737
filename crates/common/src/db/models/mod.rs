//! SeaORM entity models
//!
//! Database entities for RagForge

mod chunk;
mod document;
mod metadata;

pub use document::{
    Entity as DocumentEntity,
    Model as Document,
    ActiveModel as DocumentActiveModel,
    Column as DocumentColumn,
    DocumentStatus,
    FailureReason,
};

pub use chunk::{
    Entity as ChunkEntity,
    Model as Chunk,
    ActiveModel as ChunkActiveModel,
    Column as ChunkColumn,
    ChunkKey,
    vector_id,
};

pub use metadata::{
    content_hash, ChunkMetadata, DocumentMetadata, Metadata, VectorMetadata, PREVIEW_CHARS,
};
