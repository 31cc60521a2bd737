//! Document management handlers

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use ragforge_common::{
    auth::TenantContext,
    db::models::{Document, DocumentMetadata},
    db::NewDocument,
    errors::{AppError, Result},
};
use ragforge_ingestion::{CleanupReport, IngestionReport};

/// Request to store a new document in `pending`
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateDocumentRequest {
    #[validate(length(min = 1, max = 512))]
    pub name: String,

    #[validate(length(min = 1))]
    pub content: String,

    #[serde(default = "default_content_type")]
    pub content_type: String,

    #[serde(default)]
    pub metadata: DocumentMetadata,
}

fn default_content_type() -> String {
    "text/plain".to_string()
}

/// Optional body for an ingestion trigger
#[derive(Debug, Default, Deserialize)]
pub struct IngestRequest {
    /// Raw content to ingest instead of the stored content
    pub content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct IngestQuery {
    /// Await the run and return its report
    #[serde(default)]
    pub wait: bool,
}

/// Document status as seen by pollers
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResponse {
    pub id: Uuid,
    pub name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub needs_reconciliation: bool,
    pub chunk_count: i32,
    pub metadata: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Document> for DocumentResponse {
    fn from(doc: Document) -> Self {
        Self {
            id: doc.id,
            name: doc.name,
            content_type: doc.content_type,
            size_bytes: doc.size_bytes,
            status: doc.status,
            failure_reason: doc.failure_reason,
            needs_reconciliation: doc.needs_reconciliation,
            chunk_count: doc.chunk_count,
            metadata: doc.metadata,
            processed_at: doc.processed_at.map(|t| t.to_rfc3339()),
            created_at: doc.created_at.to_rfc3339(),
            updated_at: doc.updated_at.to_rfc3339(),
        }
    }
}

/// Acknowledgement for a background ingestion
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestAccepted {
    pub document_id: Uuid,
    pub status: &'static str,
    pub poll_url: String,
}

/// Store a document; ingestion is triggered separately
pub async fn create_document(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(request): Json<CreateDocumentRequest>,
) -> Result<(StatusCode, Json<DocumentResponse>)> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let document = state
        .documents
        .create_document(NewDocument {
            organization_id: tenant.organization_id.clone(),
            name: request.name,
            content: request.content,
            content_type: request.content_type,
            metadata: request.metadata,
        })
        .await?;

    tracing::info!(
        document_id = %document.id,
        organization_id = %tenant.organization_id,
        size_bytes = document.size_bytes,
        "Document created"
    );

    Ok((StatusCode::CREATED, Json(document.into())))
}

/// Poll a document's processing status
pub async fn get_document(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<Json<DocumentResponse>> {
    let document = state
        .documents
        .find_document(&tenant.organization_id, id)
        .await?
        .ok_or_else(|| AppError::DocumentNotFound { id: id.to_string() })?;

    Ok(Json(document.into()))
}

/// Delete a document with its chunks and vectors
pub async fn delete_document(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<Json<CleanupReport>> {
    let report = state.pipeline.delete_document(&tenant.organization_id, id).await?;
    Ok(Json(report))
}

/// Start ingestion.
///
/// The run always executes on its own task so a dropped connection cannot
/// stop it between steps. With `?wait=true` the handler awaits that task.
pub async fn ingest_document(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
    Query(query): Query<IngestQuery>,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    let request: IngestRequest = if body.is_empty() {
        IngestRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::validation("body", e.to_string()))?
    };

    state.pipeline.ensure_ingestible(id, &tenant.organization_id).await?;

    let pipeline = state.pipeline.clone();
    let organization_id = tenant.organization_id.clone();
    let run = tokio::spawn(async move {
        match request.content {
            Some(content) => pipeline.ingest_content(id, &content, &organization_id).await,
            None => pipeline.ingest(id, &organization_id).await,
        }
    });

    if !query.wait {
        tokio::spawn(async move {
            match run.await {
                Ok(Ok(report)) if !report.success => {
                    tracing::warn!(document_id = %id, failure = ?report.failure, "Background ingestion failed")
                }
                Ok(Err(e)) => tracing::error!(document_id = %id, error = %e, "Background ingestion errored"),
                Err(e) => tracing::error!(document_id = %id, error = %e, "Ingestion task panicked"),
                Ok(Ok(_)) => {}
            }
        });

        let accepted = IngestAccepted {
            document_id: id,
            status: "accepted",
            poll_url: format!("/v1/documents/{}", id),
        };
        return Ok((StatusCode::ACCEPTED, Json(serde_json::to_value(accepted)?)));
    }

    let report: IngestionReport = run.await.map_err(|e| AppError::Internal {
        message: format!("ingestion task failed: {}", e),
    })??;

    Ok((StatusCode::OK, Json(serde_json::to_value(report)?)))
}

/// Clear a failed document's chunk-without-vector state
pub async fn reconcile_document(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<Json<CleanupReport>> {
    let report = state.pipeline.reconcile(&tenant.organization_id, id).await?;
    Ok(Json(report))
}
