//! Repository pattern for database operations
//!
//! Postgres-backed [`DocumentStore`] with read/write connection split
//! and transactional chunk inserts.

use crate::db::models::*;
use crate::db::store::{DocumentStore, NewChunk, NewDocument};
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    pub fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    async fn load_for_update(&self, id: Uuid) -> Result<DocumentActiveModel> {
        let doc = DocumentEntity::find_by_id(id)
            .one(self.write_conn())
            .await?
            .ok_or_else(|| AppError::DocumentNotFound { id: id.to_string() })?;

        let mut active: DocumentActiveModel = doc.into();
        active.updated_at = Set(chrono::Utc::now().into());
        Ok(active)
    }
}

#[async_trait]
impl DocumentStore for Repository {
    // ========================================================================
    // Health Check
    // ========================================================================

    async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Document Operations
    // ========================================================================

    async fn create_document(&self, doc: NewDocument) -> Result<Document> {
        let now = chrono::Utc::now();

        let document = DocumentActiveModel {
            id: Set(Uuid::new_v4()),
            organization_id: Set(doc.organization_id),
            name: Set(doc.name),
            size_bytes: Set(doc.content.len() as i64),
            content: Set(doc.content),
            content_type: Set(doc.content_type),
            metadata: Set(serde_json::to_value(&doc.metadata)?),
            status: Set(DocumentStatus::Pending.into()),
            failure_reason: Set(None),
            needs_reconciliation: Set(false),
            chunk_count: Set(0),
            processed_at: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        document.insert(self.write_conn()).await.map_err(Into::into)
    }

    async fn find_document(&self, organization_id: &str, id: Uuid) -> Result<Option<Document>> {
        DocumentEntity::find_by_id(id)
            .filter(DocumentColumn::OrganizationId.eq(organization_id))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn begin_processing(&self, organization_id: &str, id: Uuid) -> Result<bool> {
        let now: DateTimeWithTimeZone = chrono::Utc::now().into();
        let result = DocumentEntity::update_many()
            .col_expr(DocumentColumn::Status, Expr::value(DocumentStatus::Processing.as_str()))
            .col_expr(DocumentColumn::UpdatedAt, Expr::value(now))
            .filter(DocumentColumn::Id.eq(id))
            .filter(DocumentColumn::OrganizationId.eq(organization_id))
            .filter(DocumentColumn::Status.is_in([
                DocumentStatus::Pending.as_str(),
                DocumentStatus::Failed.as_str(),
            ]))
            .filter(DocumentColumn::NeedsReconciliation.eq(false))
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected == 1)
    }

    async fn mark_failed(&self, id: Uuid, reason: FailureReason, needs_reconciliation: bool) -> Result<()> {
        let mut active = self.load_for_update(id).await?;
        active.status = Set(DocumentStatus::Failed.into());
        active.failure_reason = Set(Some(reason.as_str().to_string()));
        active.needs_reconciliation = Set(needs_reconciliation);
        active.update(self.write_conn()).await?;
        Ok(())
    }

    async fn mark_processed(&self, id: Uuid, chunk_count: i32) -> Result<()> {
        let mut active = self.load_for_update(id).await?;
        active.status = Set(DocumentStatus::Processed.into());
        active.chunk_count = Set(chunk_count);
        active.failure_reason = Set(None);
        active.processed_at = Set(Some(chrono::Utc::now().into()));
        active.update(self.write_conn()).await?;
        Ok(())
    }

    async fn reset_document(&self, id: Uuid) -> Result<()> {
        let mut active = self.load_for_update(id).await?;
        active.status = Set(DocumentStatus::Pending.into());
        active.failure_reason = Set(None);
        active.needs_reconciliation = Set(false);
        active.chunk_count = Set(0);
        active.processed_at = Set(None);
        active.update(self.write_conn()).await?;
        Ok(())
    }

    // ========================================================================
    // Chunk Operations
    // ========================================================================

    async fn insert_chunks(&self, chunks: Vec<NewChunk>) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let now = chrono::Utc::now();
        let mut rows = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            rows.push(ChunkActiveModel {
                id: Set(Uuid::new_v4()),
                organization_id: Set(chunk.organization_id),
                document_id: Set(chunk.document_id),
                content: Set(chunk.content),
                chunk_index: Set(chunk.chunk_index),
                token_count: Set(chunk.token_count),
                embedding: Set(None),
                metadata: Set(serde_json::to_value(Metadata::Ingestion(chunk.metadata))?),
                created_at: Set(now.into()),
            });
        }

        let txn = self.write_conn().begin().await?;
        ChunkEntity::insert_many(rows).exec(&txn).await?;
        txn.commit().await?;

        Ok(())
    }

    async fn get_chunks(&self, organization_id: &str, keys: &[ChunkKey]) -> Result<Vec<Chunk>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let by_key = keys.iter().fold(Condition::any(), |cond, key| {
            cond.add(
                Condition::all()
                    .add(ChunkColumn::DocumentId.eq(key.document_id))
                    .add(ChunkColumn::ChunkIndex.eq(key.chunk_index)),
            )
        });

        ChunkEntity::find()
            .filter(ChunkColumn::OrganizationId.eq(organization_id))
            .filter(by_key)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn chunk_indices(&self, organization_id: &str, document_id: Uuid) -> Result<Vec<i32>> {
        ChunkEntity::find()
            .select_only()
            .column(ChunkColumn::ChunkIndex)
            .filter(ChunkColumn::OrganizationId.eq(organization_id))
            .filter(ChunkColumn::DocumentId.eq(document_id))
            .order_by_asc(ChunkColumn::ChunkIndex)
            .into_tuple::<i32>()
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn delete_chunks(&self, organization_id: &str, document_id: Uuid) -> Result<u64> {
        let result = ChunkEntity::delete_many()
            .filter(ChunkColumn::OrganizationId.eq(organization_id))
            .filter(ChunkColumn::DocumentId.eq(document_id))
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected)
    }

    async fn delete_document(&self, organization_id: &str, id: Uuid) -> Result<Option<Vec<i32>>> {
        let txn = self.write_conn().begin().await?;

        let exists = DocumentEntity::find_by_id(id)
            .filter(DocumentColumn::OrganizationId.eq(organization_id))
            .one(&txn)
            .await?
            .is_some();
        if !exists {
            txn.rollback().await?;
            return Ok(None);
        }

        let indices: Vec<i32> = ChunkEntity::find()
            .select_only()
            .column(ChunkColumn::ChunkIndex)
            .filter(ChunkColumn::DocumentId.eq(id))
            .order_by_asc(ChunkColumn::ChunkIndex)
            .into_tuple::<i32>()
            .all(&txn)
            .await?;

        // Chunk rows go with the document via ON DELETE CASCADE
        DocumentEntity::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;

        Ok(Some(indices))
    }
}
