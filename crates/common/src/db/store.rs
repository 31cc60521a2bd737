//! Document store abstraction
//!
//! The ingestion pipeline, the vector retriever and the gateway talk to
//! persisted documents and chunks only through [`DocumentStore`]. Every
//! read is scoped by organization id.

use crate::db::models::{Chunk, ChunkKey, ChunkMetadata, Document, DocumentMetadata, FailureReason};
use crate::errors::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// A document as supplied by the upload layer
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub organization_id: String,
    pub name: String,
    pub content: String,
    pub content_type: String,
    pub metadata: DocumentMetadata,
}

/// A chunk row ready to be persisted
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub document_id: Uuid,
    pub organization_id: String,
    pub chunk_index: i32,
    pub content: String,
    pub token_count: i32,
    pub metadata: ChunkMetadata,
}

impl NewChunk {
    pub fn key(&self) -> ChunkKey {
        ChunkKey::new(self.document_id, self.chunk_index)
    }
}

/// Persistence for documents and their chunks
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Check connectivity
    async fn ping(&self) -> Result<()>;

    /// Persist a new document in `pending`
    async fn create_document(&self, doc: NewDocument) -> Result<Document>;

    /// Find a document owned by the organization
    async fn find_document(&self, organization_id: &str, id: Uuid) -> Result<Option<Document>>;

    /// Atomically move a document to `processing` when it is `pending`, or
    /// `failed` without the reconciliation flag. Returns `false` when the
    /// document is missing or in any other state; only the caller that gets
    /// `true` owns the ingestion run.
    async fn begin_processing(&self, organization_id: &str, id: Uuid) -> Result<bool>;

    /// Move a document to `failed`, recording why
    async fn mark_failed(&self, id: Uuid, reason: FailureReason, needs_reconciliation: bool) -> Result<()>;

    /// Move a document to `processed`, recording chunk count and timestamp
    async fn mark_processed(&self, id: Uuid, chunk_count: i32) -> Result<()>;

    /// Reset a reconciled document to `pending`, clearing failure state
    async fn reset_document(&self, id: Uuid) -> Result<()>;

    /// Persist a batch of chunks atomically
    async fn insert_chunks(&self, chunks: Vec<NewChunk>) -> Result<()>;

    /// Fetch chunks by natural key; missing keys are skipped
    async fn get_chunks(&self, organization_id: &str, keys: &[ChunkKey]) -> Result<Vec<Chunk>>;

    /// Chunk indices currently persisted for a document, ascending
    async fn chunk_indices(&self, organization_id: &str, document_id: Uuid) -> Result<Vec<i32>>;

    /// Delete all chunk rows of a document, returning how many were removed
    async fn delete_chunks(&self, organization_id: &str, document_id: Uuid) -> Result<u64>;

    /// Delete a document and its chunks. Returns the removed chunk indices,
    /// or `None` when the document does not exist for the organization.
    async fn delete_document(&self, organization_id: &str, id: Uuid) -> Result<Option<Vec<i32>>>;
}
