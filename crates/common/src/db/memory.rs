//! In-memory document store
//!
//! Backs local runs and tests. Behaves like the Postgres repository,
//! including tenant scoping and cascade deletes.

use crate::db::models::{Chunk, ChunkKey, Document, DocumentStatus, FailureReason, Metadata};
use crate::db::store::{DocumentStore, NewChunk, NewDocument};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    documents: HashMap<Uuid, Document>,
    /// Ordered by natural key so scans come out deterministic
    chunks: BTreeMap<ChunkKey, Chunk>,
}

#[derive(Default)]
pub struct InMemoryDocumentStore {
    inner: RwLock<Inner>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chunks the organization may search, in natural key order. Chunks of
    /// documents flagged for reconciliation have no vectors and are left out.
    pub async fn searchable_chunks(&self, organization_id: &str) -> Vec<Chunk> {
        let inner = self.inner.read().await;
        inner
            .chunks
            .values()
            .filter(|c| c.organization_id == organization_id)
            .filter(|c| {
                inner
                    .documents
                    .get(&c.document_id)
                    .is_some_and(|d| !d.needs_reconciliation)
            })
            .cloned()
            .collect()
    }

    async fn update<F>(&self, id: Uuid, f: F) -> Result<()>
    where
        F: FnOnce(&mut Document) + Send,
    {
        let mut inner = self.inner.write().await;
        let doc = inner
            .documents
            .get_mut(&id)
            .ok_or_else(|| AppError::DocumentNotFound { id: id.to_string() })?;
        f(doc);
        doc.updated_at = Utc::now().into();
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn create_document(&self, doc: NewDocument) -> Result<Document> {
        let now = Utc::now();
        let document = Document {
            id: Uuid::new_v4(),
            organization_id: doc.organization_id,
            name: doc.name,
            size_bytes: doc.content.len() as i64,
            content: doc.content,
            content_type: doc.content_type,
            metadata: serde_json::to_value(&doc.metadata)?,
            status: DocumentStatus::Pending.into(),
            failure_reason: None,
            needs_reconciliation: false,
            chunk_count: 0,
            processed_at: None,
            created_at: now.into(),
            updated_at: now.into(),
        };

        self.inner
            .write()
            .await
            .documents
            .insert(document.id, document.clone());

        Ok(document)
    }

    async fn find_document(&self, organization_id: &str, id: Uuid) -> Result<Option<Document>> {
        let inner = self.inner.read().await;
        Ok(inner
            .documents
            .get(&id)
            .filter(|d| d.organization_id == organization_id)
            .cloned())
    }

    async fn begin_processing(&self, organization_id: &str, id: Uuid) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let Some(doc) = inner
            .documents
            .get_mut(&id)
            .filter(|d| d.organization_id == organization_id)
        else {
            return Ok(false);
        };

        let claimable = match doc.document_status() {
            DocumentStatus::Pending => true,
            DocumentStatus::Failed => !doc.needs_reconciliation,
            DocumentStatus::Processing | DocumentStatus::Processed => false,
        };
        if claimable {
            doc.status = DocumentStatus::Processing.into();
            doc.updated_at = Utc::now().into();
        }
        Ok(claimable)
    }

    async fn mark_failed(&self, id: Uuid, reason: FailureReason, needs_reconciliation: bool) -> Result<()> {
        self.update(id, |doc| {
            doc.status = DocumentStatus::Failed.into();
            doc.failure_reason = Some(reason.as_str().to_string());
            doc.needs_reconciliation = needs_reconciliation;
        })
        .await
    }

    async fn mark_processed(&self, id: Uuid, chunk_count: i32) -> Result<()> {
        self.update(id, |doc| {
            doc.status = DocumentStatus::Processed.into();
            doc.chunk_count = chunk_count;
            doc.failure_reason = None;
            doc.processed_at = Some(Utc::now().into());
        })
        .await
    }

    async fn reset_document(&self, id: Uuid) -> Result<()> {
        self.update(id, |doc| {
            doc.status = DocumentStatus::Pending.into();
            doc.failure_reason = None;
            doc.needs_reconciliation = false;
            doc.chunk_count = 0;
            doc.processed_at = None;
        })
        .await
    }

    async fn insert_chunks(&self, chunks: Vec<NewChunk>) -> Result<()> {
        let mut inner = self.inner.write().await;

        // All-or-nothing, like the transactional insert
        for chunk in &chunks {
            if inner.chunks.contains_key(&chunk.key()) {
                return Err(AppError::Conflict {
                    message: format!("Chunk {} already exists", chunk.key()),
                });
            }
        }

        let now = Utc::now();
        for chunk in chunks {
            let key = chunk.key();
            let row = Chunk {
                id: Uuid::new_v4(),
                organization_id: chunk.organization_id,
                document_id: chunk.document_id,
                content: chunk.content,
                chunk_index: chunk.chunk_index,
                token_count: chunk.token_count,
                embedding: None,
                metadata: serde_json::to_value(Metadata::Ingestion(chunk.metadata))?,
                created_at: now.into(),
            };
            inner.chunks.insert(key, row);
        }

        Ok(())
    }

    async fn get_chunks(&self, organization_id: &str, keys: &[ChunkKey]) -> Result<Vec<Chunk>> {
        let inner = self.inner.read().await;
        Ok(keys
            .iter()
            .filter_map(|k| inner.chunks.get(k))
            .filter(|c| c.organization_id == organization_id)
            .cloned()
            .collect())
    }

    async fn chunk_indices(&self, organization_id: &str, document_id: Uuid) -> Result<Vec<i32>> {
        let inner = self.inner.read().await;
        Ok(inner
            .chunks
            .values()
            .filter(|c| c.document_id == document_id && c.organization_id == organization_id)
            .map(|c| c.chunk_index)
            .collect())
    }

    async fn delete_chunks(&self, organization_id: &str, document_id: Uuid) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let before = inner.chunks.len();
        inner
            .chunks
            .retain(|_, c| !(c.document_id == document_id && c.organization_id == organization_id));
        Ok((before - inner.chunks.len()) as u64)
    }

    async fn delete_document(&self, organization_id: &str, id: Uuid) -> Result<Option<Vec<i32>>> {
        let mut inner = self.inner.write().await;

        let owned = inner
            .documents
            .get(&id)
            .is_some_and(|d| d.organization_id == organization_id);
        if !owned {
            return Ok(None);
        }

        inner.documents.remove(&id);
        let mut removed = Vec::new();
        inner.chunks.retain(|_, c| {
            if c.document_id == id {
                removed.push(c.chunk_index);
                false
            } else {
                true
            }
        });
        removed.sort_unstable();

        Ok(Some(removed))
    }
}
