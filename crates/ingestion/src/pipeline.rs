//! Document ingestion pipeline
//!
//! Drives a document through `pending → processing → processed | failed`:
//! chunk, embed the whole batch, persist chunk rows, upsert vectors. Steps
//! run strictly in order and every failure lands the document in a terminal
//! state with a recorded reason.
//!
//! Also owns the two operations that undo ingestion: document deletion
//! (with vector purge) and explicit reconciliation of half-indexed documents.

use crate::chunker::{chunk_text, ChunkingConfig, TextChunk};
use ragforge_common::db::models::{
    vector_id, ChunkMetadata, Document, DocumentStatus, FailureReason, VectorMetadata,
};
use ragforge_common::db::{DocumentStore, NewChunk};
use ragforge_common::embeddings::Embedder;
use ragforge_common::errors::{AppError, Result};
use ragforge_common::metrics;
use ragforge_common::vector::{VectorIndex, VectorRecord};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Outcome of one ingestion run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionReport {
    pub document_id: Uuid,
    pub chunk_count: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What a delete or reconcile removed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub document_id: Uuid,
    pub chunks_removed: u64,
    pub vectors_purged: usize,
}

/// Ingestion pipeline with injected collaborators
pub struct IngestionPipeline {
    store: Arc<dyn DocumentStore>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    chunking: ChunkingConfig,
}

impl IngestionPipeline {
    /// Build a pipeline, rejecting an invalid chunking config or an
    /// embedder whose dimension differs from the index
    pub fn new(
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        chunking: ChunkingConfig,
    ) -> Result<Self> {
        chunking.validate()?;

        if embedder.dimension() != index.dimension() {
            return Err(AppError::DimensionMismatch {
                expected: index.dimension(),
                actual: embedder.dimension(),
            });
        }

        Ok(Self {
            store,
            embedder,
            index,
            chunking,
        })
    }

    pub fn chunking(&self) -> &ChunkingConfig {
        &self.chunking
    }

    /// Ingest a persisted document using its stored content
    #[instrument(skip_all, fields(document_id = %document_id, organization_id = %organization_id))]
    pub async fn ingest(&self, document_id: Uuid, organization_id: &str) -> Result<IngestionReport> {
        let document = self.claim(document_id, organization_id).await?;
        self.run(document.id, &document.content, organization_id).await
    }

    /// Ingest a persisted document using caller-supplied raw content
    #[instrument(skip_all, fields(document_id = %document_id, organization_id = %organization_id, content_len = raw_content.len()))]
    pub async fn ingest_content(
        &self,
        document_id: Uuid,
        raw_content: &str,
        organization_id: &str,
    ) -> Result<IngestionReport> {
        let document = self.claim(document_id, organization_id).await?;
        self.run(document.id, raw_content, organization_id).await
    }

    /// Check that a document exists and may be ingested, without starting a run
    pub async fn ensure_ingestible(&self, document_id: Uuid, organization_id: &str) -> Result<()> {
        self.load_ingestible(document_id, organization_id).await.map(|_| ())
    }

    /// Fetch the document and refuse states that must not be (re)ingested
    async fn load_ingestible(&self, document_id: Uuid, organization_id: &str) -> Result<Document> {
        let document = self
            .store
            .find_document(organization_id, document_id)
            .await?
            .ok_or_else(|| AppError::DocumentNotFound {
                id: document_id.to_string(),
            })?;

        match document.document_status() {
            DocumentStatus::Processed => Err(AppError::Conflict {
                message: format!("Document {} is already processed", document_id),
            }),
            DocumentStatus::Processing => Err(AppError::Conflict {
                message: format!("Document {} is already being processed", document_id),
            }),
            DocumentStatus::Failed if document.needs_reconciliation => Err(AppError::Conflict {
                message: format!(
                    "Document {} has chunks without vectors and must be reconciled first",
                    document_id
                ),
            }),
            DocumentStatus::Pending | DocumentStatus::Failed => Ok(document),
        }
    }

    /// Take ownership of a run: check the state, then flip to `processing`
    /// atomically. Of several concurrent triggers exactly one gets through.
    async fn claim(&self, document_id: Uuid, organization_id: &str) -> Result<Document> {
        let document = self.load_ingestible(document_id, organization_id).await?;

        if !self.store.begin_processing(organization_id, document_id).await? {
            return Err(AppError::Conflict {
                message: format!("Document {} is already being processed", document_id),
            });
        }
        Ok(document)
    }

    async fn run(&self, document_id: Uuid, raw_content: &str, organization_id: &str) -> Result<IngestionReport> {
        let started = Instant::now();
        info!("Ingestion started");

        // 1. Chunk
        let chunks = chunk_text(raw_content, &self.chunking);
        if chunks.is_empty() {
            return self
                .fail(document_id, FailureReason::EmptyContent, "document has no content", started)
                .await;
        }

        // 2. Embed, all or nothing
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = match self.embed_all(&texts).await {
            Ok(vectors) => vectors,
            Err(e @ AppError::DimensionMismatch { .. }) => {
                error!(error = %e, "Embedding dimension mismatch");
                self.fail(document_id, FailureReason::EmbeddingFailure, &e.to_string(), started)
                    .await?;
                return Err(e);
            }
            Err(e) => {
                return self
                    .fail(document_id, FailureReason::EmbeddingFailure, &e.to_string(), started)
                    .await;
            }
        };

        // 3. Persist chunk rows
        let rows = chunks
            .iter()
            .map(|c| new_chunk(document_id, organization_id, c))
            .collect();
        if let Err(e) = self.store.insert_chunks(rows).await {
            return self
                .fail(document_id, FailureReason::PersistenceFailure, &e.to_string(), started)
                .await;
        }

        // 4. Upsert vectors
        let records: Vec<VectorRecord> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, values)| VectorRecord {
                id: vector_id(document_id, chunk.index),
                values,
                metadata: VectorMetadata::new(
                    &document_id.to_string(),
                    chunk.index,
                    organization_id,
                    &chunk.content,
                ),
            })
            .collect();
        if let Err(e) = self.index.upsert(&records).await {
            warn!(
                chunk_count = chunks.len(),
                error = %e,
                "Chunks persisted without vectors, document needs reconciliation"
            );
            return self
                .fail(document_id, FailureReason::IndexFailure, &e.to_string(), started)
                .await;
        }

        // 5. Done. Rows and vectors both exist now, so a lost status write
        // must leave the document flagged rather than stuck in `processing`.
        if let Err(e) = self.store.mark_processed(document_id, chunks.len() as i32).await {
            error!(error = %e, "Could not record processed state");
            if let Err(flag_err) = self
                .store
                .mark_failed(document_id, FailureReason::PersistenceFailure, true)
                .await
            {
                error!(error = %flag_err, "Document left in processing, reconcile it explicitly");
            }
            metrics::record_ingestion(
                started.elapsed().as_secs_f64(),
                0,
                FailureReason::PersistenceFailure.as_str(),
            );
            return Err(e);
        }

        let elapsed = started.elapsed().as_secs_f64();
        metrics::record_ingestion(elapsed, chunks.len(), "processed");
        info!(chunk_count = chunks.len(), duration_secs = elapsed, "Document processed");

        Ok(IngestionReport {
            document_id,
            chunk_count: chunks.len(),
            success: true,
            failure: None,
            error: None,
        })
    }

    async fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let started = Instant::now();
        let result = self.embedder.embed_batch(texts).await.and_then(|vectors| {
            if vectors.len() != texts.len() {
                return Err(AppError::EmbeddingFailure {
                    message: format!("Expected {} embeddings, got {}", texts.len(), vectors.len()),
                });
            }
            let expected = self.index.dimension();
            if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
                return Err(AppError::DimensionMismatch {
                    expected,
                    actual: bad.len(),
                });
            }
            Ok(vectors)
        });

        metrics::record_embedding(
            started.elapsed().as_secs_f64(),
            self.embedder.model_name(),
            texts.len(),
            result.is_ok(),
        );
        result
    }

    /// Record a terminal failure and report it
    async fn fail(
        &self,
        document_id: Uuid,
        reason: FailureReason,
        message: &str,
        started: Instant,
    ) -> Result<IngestionReport> {
        self.store
            .mark_failed(document_id, reason, reason.leaves_inconsistency())
            .await?;

        metrics::record_ingestion(started.elapsed().as_secs_f64(), 0, reason.as_str());
        warn!(reason = %reason, error = %message, "Ingestion failed");

        Ok(IngestionReport {
            document_id,
            chunk_count: 0,
            success: false,
            failure: Some(reason),
            error: Some(message.to_string()),
        })
    }

    // ========================================================================
    // Cleanup
    // ========================================================================

    /// Delete a document, its chunk rows and its vectors
    #[instrument(skip_all, fields(document_id = %document_id, organization_id = %organization_id))]
    pub async fn delete_document(&self, organization_id: &str, document_id: Uuid) -> Result<CleanupReport> {
        let indices = self
            .store
            .delete_document(organization_id, document_id)
            .await?
            .ok_or_else(|| AppError::DocumentNotFound {
                id: document_id.to_string(),
            })?;

        let ids: Vec<String> = indices.iter().map(|i| vector_id(document_id, *i)).collect();
        if let Err(e) = self.index.delete(&ids).await {
            warn!(
                orphaned_vectors = ids.len(),
                error = %e,
                "Document deleted but vector purge failed, orphaned vectors remain"
            );
            return Err(AppError::IndexFailure {
                message: format!(
                    "document {} deleted but {} vectors were not purged: {}",
                    document_id,
                    ids.len(),
                    e
                ),
            });
        }

        info!(chunks_removed = indices.len(), "Document deleted");
        Ok(CleanupReport {
            document_id,
            chunks_removed: indices.len() as u64,
            vectors_purged: ids.len(),
        })
    }

    /// Clear the chunk-without-vector state of a flagged document, or of one
    /// whose run died in `processing`, and return it to `pending`. Never runs
    /// on its own.
    #[instrument(skip_all, fields(document_id = %document_id, organization_id = %organization_id))]
    pub async fn reconcile(&self, organization_id: &str, document_id: Uuid) -> Result<CleanupReport> {
        let document = self
            .store
            .find_document(organization_id, document_id)
            .await?
            .ok_or_else(|| AppError::DocumentNotFound {
                id: document_id.to_string(),
            })?;

        let stranded = match document.document_status() {
            DocumentStatus::Failed => document.needs_reconciliation,
            DocumentStatus::Processing => true,
            DocumentStatus::Pending | DocumentStatus::Processed => false,
        };
        if !stranded {
            return Err(AppError::Conflict {
                message: format!("Document {} does not need reconciliation", document_id),
            });
        }

        let indices = self.store.chunk_indices(organization_id, document_id).await?;
        let ids: Vec<String> = indices.iter().map(|i| vector_id(document_id, *i)).collect();

        // Vectors first: if this fails the flag stays set and rows remain
        self.index.delete(&ids).await?;
        let chunks_removed = self.store.delete_chunks(organization_id, document_id).await?;
        self.store.reset_document(document_id).await?;

        info!(chunks_removed, vectors_purged = ids.len(), "Document reconciled");
        Ok(CleanupReport {
            document_id,
            chunks_removed,
            vectors_purged: ids.len(),
        })
    }
}

fn new_chunk(document_id: Uuid, organization_id: &str, chunk: &TextChunk) -> NewChunk {
    NewChunk {
        document_id,
        organization_id: organization_id.to_string(),
        chunk_index: chunk.index,
        content: chunk.content.clone(),
        token_count: chunk.token_count,
        metadata: ChunkMetadata::new(chunk.char_start, chunk.char_end, &chunk.content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ragforge_common::db::models::{Chunk, ChunkKey, DocumentMetadata};
    use ragforge_common::db::{InMemoryDocumentStore, NewDocument};
    use ragforge_common::embeddings::MockEmbedder;
    use ragforge_common::vector::{InMemoryVectorIndex, VectorMatch, VectorQuery};
    use std::sync::atomic::{AtomicBool, Ordering};

    const DIM: usize = 32;

    /// In-memory index whose writes can be switched to fail
    struct FlakyIndex {
        inner: InMemoryVectorIndex,
        fail_upsert: AtomicBool,
        fail_delete: AtomicBool,
    }

    impl FlakyIndex {
        fn new() -> Self {
            Self {
                inner: InMemoryVectorIndex::new(DIM),
                fail_upsert: AtomicBool::new(false),
                fail_delete: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl VectorIndex for FlakyIndex {
        async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
            if self.fail_upsert.load(Ordering::SeqCst) {
                return Err(AppError::IndexFailure { message: "upsert rejected".into() });
            }
            self.inner.upsert(records).await
        }

        async fn query(&self, query: &VectorQuery) -> Result<Vec<VectorMatch>> {
            self.inner.query(query).await
        }

        async fn delete(&self, ids: &[String]) -> Result<()> {
            if self.fail_delete.load(Ordering::SeqCst) {
                return Err(AppError::IndexFailure { message: "delete rejected".into() });
            }
            self.inner.delete(ids).await
        }

        fn dimension(&self) -> usize {
            DIM
        }
    }

    /// In-memory store with switchable latency and write failures
    struct ScriptedStore {
        inner: InMemoryDocumentStore,
        slow_reads: AtomicBool,
        fail_mark_processed: AtomicBool,
    }

    impl ScriptedStore {
        fn new() -> Self {
            Self {
                inner: InMemoryDocumentStore::new(),
                slow_reads: AtomicBool::new(false),
                fail_mark_processed: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl DocumentStore for ScriptedStore {
        async fn ping(&self) -> Result<()> {
            self.inner.ping().await
        }

        async fn create_document(&self, doc: NewDocument) -> Result<Document> {
            self.inner.create_document(doc).await
        }

        async fn find_document(&self, organization_id: &str, id: Uuid) -> Result<Option<Document>> {
            let found = self.inner.find_document(organization_id, id).await;
            // Hand control back after the read, like a network round trip
            if self.slow_reads.load(Ordering::SeqCst) {
                tokio::task::yield_now().await;
            }
            found
        }

        async fn begin_processing(&self, organization_id: &str, id: Uuid) -> Result<bool> {
            self.inner.begin_processing(organization_id, id).await
        }

        async fn mark_failed(&self, id: Uuid, reason: FailureReason, needs_reconciliation: bool) -> Result<()> {
            self.inner.mark_failed(id, reason, needs_reconciliation).await
        }

        async fn mark_processed(&self, id: Uuid, chunk_count: i32) -> Result<()> {
            if self.fail_mark_processed.load(Ordering::SeqCst) {
                return Err(AppError::Internal { message: "connection reset".into() });
            }
            self.inner.mark_processed(id, chunk_count).await
        }

        async fn reset_document(&self, id: Uuid) -> Result<()> {
            self.inner.reset_document(id).await
        }

        async fn insert_chunks(&self, chunks: Vec<NewChunk>) -> Result<()> {
            self.inner.insert_chunks(chunks).await
        }

        async fn get_chunks(&self, organization_id: &str, keys: &[ChunkKey]) -> Result<Vec<Chunk>> {
            self.inner.get_chunks(organization_id, keys).await
        }

        async fn chunk_indices(&self, organization_id: &str, document_id: Uuid) -> Result<Vec<i32>> {
            self.inner.chunk_indices(organization_id, document_id).await
        }

        async fn delete_chunks(&self, organization_id: &str, document_id: Uuid) -> Result<u64> {
            self.inner.delete_chunks(organization_id, document_id).await
        }

        async fn delete_document(&self, organization_id: &str, id: Uuid) -> Result<Option<Vec<i32>>> {
            self.inner.delete_document(organization_id, id).await
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(AppError::EmbeddingFailure { message: "rate limited".into() })
        }

        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(AppError::EmbeddingFailure { message: "rate limited".into() })
        }

        fn model_name(&self) -> &str {
            "failing"
        }

        fn dimension(&self) -> usize {
            DIM
        }
    }

    /// Claims the right dimension but returns shorter vectors
    struct ShortEmbedder;

    #[async_trait]
    impl Embedder for ShortEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.1; DIM - 1])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.1; DIM - 1]).collect())
        }

        fn model_name(&self) -> &str {
            "short"
        }

        fn dimension(&self) -> usize {
            DIM
        }
    }

    struct Fixture {
        store: Arc<ScriptedStore>,
        index: Arc<FlakyIndex>,
        pipeline: IngestionPipeline,
    }

    fn fixture_with(embedder: Arc<dyn Embedder>) -> Fixture {
        let store = Arc::new(ScriptedStore::new());
        let index = Arc::new(FlakyIndex::new());
        let pipeline = IngestionPipeline::new(
            store.clone(),
            embedder,
            index.clone(),
            ChunkingConfig::new(1000, 200),
        )
        .unwrap();
        Fixture { store, index, pipeline }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(MockEmbedder::new(DIM)))
    }

    async fn upload(store: &ScriptedStore, org: &str, content: &str) -> Uuid {
        store
            .create_document(NewDocument {
                organization_id: org.to_string(),
                name: "doc.txt".to_string(),
                content: content.to_string(),
                content_type: "text/plain".to_string(),
                metadata: DocumentMetadata::default(),
            })
            .await
            .unwrap()
            .id
    }

    fn long_text() -> String {
        let mut words = vec!["The", "quick", "brown", "fox."];
        words.extend(std::iter::repeat("lorem").take(2496));
        words.join(" ")
    }

    async fn status(store: &ScriptedStore, org: &str, id: Uuid) -> Document {
        store.find_document(org, id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_happy_path() {
        let f = fixture();
        let id = upload(&f.store, "org-a", &long_text()).await;

        let report = f.pipeline.ingest(id, "org-a").await.unwrap();
        assert!(report.success);
        assert_eq!(report.chunk_count, 3);

        let doc = status(&f.store, "org-a", id).await;
        assert_eq!(doc.document_status(), DocumentStatus::Processed);
        assert_eq!(doc.chunk_count, 3);
        assert!(doc.processed_at.is_some());

        let expected: Vec<String> = (0..3).map(|i| format!("{}-{}", id, i)).collect();
        assert_eq!(f.index.inner.ids().await, expected);

        let keys: Vec<ChunkKey> = (0..3).map(|i| ChunkKey::new(id, i)).collect();
        assert_eq!(f.store.get_chunks("org-a", &keys).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_reingest_processed_is_conflict() {
        let f = fixture();
        let id = upload(&f.store, "org-a", "short document body").await;
        f.pipeline.ingest(id, "org-a").await.unwrap();

        let err = f.pipeline.ingest(id, "org-a").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_ingest_runs_once() {
        let f = fixture();
        let id = upload(&f.store, "org-a", &long_text()).await;
        f.store.slow_reads.store(true, Ordering::SeqCst);

        let (a, b) = tokio::join!(f.pipeline.ingest(id, "org-a"), f.pipeline.ingest(id, "org-a"));

        let (won, lost) = if a.is_ok() { (a, b) } else { (b, a) };
        assert!(won.unwrap().success);
        assert!(matches!(lost, Err(AppError::Conflict { .. })));

        let doc = status(&f.store, "org-a", id).await;
        assert_eq!(doc.document_status(), DocumentStatus::Processed);
        assert_eq!(doc.failure(), None);
        assert_eq!(f.store.chunk_indices("org-a", id).await.unwrap(), vec![0, 1, 2]);
        assert_eq!(f.index.inner.len().await, 3);
    }

    #[tokio::test]
    async fn test_lost_processed_write_flags_document() {
        let f = fixture();
        let id = upload(&f.store, "org-a", "a few words").await;
        f.store.fail_mark_processed.store(true, Ordering::SeqCst);

        let err = f.pipeline.ingest(id, "org-a").await.unwrap_err();
        assert!(matches!(err, AppError::Internal { .. }));

        let doc = status(&f.store, "org-a", id).await;
        assert_eq!(doc.document_status(), DocumentStatus::Failed);
        assert_eq!(doc.failure(), Some(FailureReason::PersistenceFailure));
        assert!(doc.needs_reconciliation);

        f.store.fail_mark_processed.store(false, Ordering::SeqCst);
        let cleanup = f.pipeline.reconcile("org-a", id).await.unwrap();
        assert_eq!(cleanup.chunks_removed, 1);
        assert!(f.index.inner.is_empty().await);

        assert!(f.pipeline.ingest(id, "org-a").await.unwrap().success);
    }

    #[tokio::test]
    async fn test_reconcile_recovers_stranded_processing() {
        let f = fixture();
        let id = upload(&f.store, "org-a", "a few words").await;
        assert!(f.store.begin_processing("org-a", id).await.unwrap());

        assert!(matches!(
            f.pipeline.ingest(id, "org-a").await,
            Err(AppError::Conflict { .. })
        ));

        f.pipeline.reconcile("org-a", id).await.unwrap();
        assert_eq!(
            status(&f.store, "org-a", id).await.document_status(),
            DocumentStatus::Pending
        );
        assert!(f.pipeline.ingest(id, "org-a").await.unwrap().success);
    }

    #[tokio::test]
    async fn test_other_tenant_cannot_ingest() {
        let f = fixture();
        let id = upload(&f.store, "org-a", "short document body").await;
        let err = f.pipeline.ingest(id, "org-b").await.unwrap_err();
        assert!(matches!(err, AppError::DocumentNotFound { .. }));
    }

    #[tokio::test]
    async fn test_empty_content_fails() {
        let f = fixture();
        let id = upload(&f.store, "org-a", "   \n ").await;

        let report = f.pipeline.ingest(id, "org-a").await.unwrap();
        assert!(!report.success);
        assert_eq!(report.failure, Some(FailureReason::EmptyContent));

        let doc = status(&f.store, "org-a", id).await;
        assert_eq!(doc.document_status(), DocumentStatus::Failed);
        assert!(!doc.needs_reconciliation);
    }

    #[tokio::test]
    async fn test_embedding_failure_persists_nothing() {
        let f = fixture_with(Arc::new(FailingEmbedder));
        let id = upload(&f.store, "org-a", "some content to embed").await;

        let report = f.pipeline.ingest(id, "org-a").await.unwrap();
        assert_eq!(report.failure, Some(FailureReason::EmbeddingFailure));
        assert!(f.store.chunk_indices("org-a", id).await.unwrap().is_empty());
        assert!(f.index.inner.is_empty().await);

        // Not flagged, so a retry is allowed
        let doc = status(&f.store, "org-a", id).await;
        assert_eq!(doc.failure(), Some(FailureReason::EmbeddingFailure));
        assert!(!doc.needs_reconciliation);
    }

    #[tokio::test]
    async fn test_short_vectors_are_fatal() {
        let f = fixture_with(Arc::new(ShortEmbedder));
        let id = upload(&f.store, "org-a", "some content to embed").await;

        let err = f.pipeline.ingest(id, "org-a").await.unwrap_err();
        assert!(matches!(err, AppError::DimensionMismatch { expected: 32, actual: 31 }));
        assert_eq!(
            status(&f.store, "org-a", id).await.document_status(),
            DocumentStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_index_failure_flags_reconciliation_then_reconcile() {
        let f = fixture();
        let id = upload(&f.store, "org-a", &long_text()).await;

        f.index.fail_upsert.store(true, Ordering::SeqCst);
        let report = f.pipeline.ingest(id, "org-a").await.unwrap();
        assert_eq!(report.failure, Some(FailureReason::IndexFailure));

        let doc = status(&f.store, "org-a", id).await;
        assert!(doc.needs_reconciliation);
        assert_eq!(f.store.chunk_indices("org-a", id).await.unwrap(), vec![0, 1, 2]);
        assert!(f.index.inner.is_empty().await);

        // Flagged documents must be reconciled before another attempt
        assert!(matches!(
            f.pipeline.ingest(id, "org-a").await,
            Err(AppError::Conflict { .. })
        ));

        let cleanup = f.pipeline.reconcile("org-a", id).await.unwrap();
        assert_eq!(cleanup.chunks_removed, 3);
        let doc = status(&f.store, "org-a", id).await;
        assert_eq!(doc.document_status(), DocumentStatus::Pending);
        assert!(!doc.needs_reconciliation);

        f.index.fail_upsert.store(false, Ordering::SeqCst);
        let report = f.pipeline.ingest(id, "org-a").await.unwrap();
        assert!(report.success);
        assert_eq!(f.index.inner.len().await, 3);
    }

    #[tokio::test]
    async fn test_reconcile_requires_flag() {
        let f = fixture();
        let id = upload(&f.store, "org-a", "body").await;
        assert!(matches!(
            f.pipeline.reconcile("org-a", id).await,
            Err(AppError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_purges_vectors() {
        let f = fixture();
        let id = upload(&f.store, "org-a", &long_text()).await;
        f.pipeline.ingest(id, "org-a").await.unwrap();

        let cleanup = f.pipeline.delete_document("org-a", id).await.unwrap();
        assert_eq!(cleanup.vectors_purged, 3);
        assert!(f.index.inner.is_empty().await);
        assert!(f.store.find_document("org-a", id).await.unwrap().is_none());

        assert!(matches!(
            f.pipeline.delete_document("org-a", id).await,
            Err(AppError::DocumentNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_purge_reports_orphans() {
        let f = fixture();
        let id = upload(&f.store, "org-a", "a few words").await;
        f.pipeline.ingest(id, "org-a").await.unwrap();

        f.index.fail_delete.store(true, Ordering::SeqCst);
        let err = f.pipeline.delete_document("org-a", id).await.unwrap_err();
        assert!(matches!(err, AppError::IndexFailure { .. }));
        // Rows are gone, the vector is the orphan
        assert!(f.store.find_document("org-a", id).await.unwrap().is_none());
        assert_eq!(f.index.inner.len().await, 1);
    }

    #[tokio::test]
    async fn test_ingest_content_uses_supplied_text() {
        let f = fixture();
        let id = upload(&f.store, "org-a", "").await;
        let report = f
            .pipeline
            .ingest_content(id, "supplied raw content", "org-a")
            .await
            .unwrap();
        assert!(report.success);
        assert_eq!(report.chunk_count, 1);
    }

    #[test]
    fn test_mismatched_dimensions_rejected_at_construction() {
        let result = IngestionPipeline::new(
            Arc::new(InMemoryDocumentStore::new()),
            Arc::new(MockEmbedder::new(16)),
            Arc::new(InMemoryVectorIndex::new(32)),
            ChunkingConfig::default(),
        );
        assert!(matches!(result, Err(AppError::DimensionMismatch { .. })));
    }
}
