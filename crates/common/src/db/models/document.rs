//! Document entity with processing status

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Document processing status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Processed,
    Failed,
}

impl From<String> for DocumentStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pending" => DocumentStatus::Pending,
            "processing" => DocumentStatus::Processing,
            "processed" => DocumentStatus::Processed,
            "failed" => DocumentStatus::Failed,
            _ => DocumentStatus::Pending,
        }
    }
}

impl From<DocumentStatus> for String {
    fn from(status: DocumentStatus) -> Self {
        status.as_str().to_string()
    }
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Processed => "processed",
            DocumentStatus::Failed => "failed",
        }
    }
}

/// Why a document ended up in `failed`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    EmptyContent,
    EmbeddingFailure,
    PersistenceFailure,
    IndexFailure,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::EmptyContent => "empty_content",
            FailureReason::EmbeddingFailure => "embedding_failure",
            FailureReason::PersistenceFailure => "persistence_failure",
            FailureReason::IndexFailure => "index_failure",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "empty_content" => Some(FailureReason::EmptyContent),
            "embedding_failure" => Some(FailureReason::EmbeddingFailure),
            "persistence_failure" => Some(FailureReason::PersistenceFailure),
            "index_failure" => Some(FailureReason::IndexFailure),
            _ => None,
        }
    }

    /// Chunk rows exist without their vectors
    pub fn leaves_inconsistency(&self) -> bool {
        matches!(self, FailureReason::IndexFailure)
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "documents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text", indexed)]
    pub organization_id: String,

    #[sea_orm(column_type = "Text")]
    pub name: String,

    /// Raw text content
    #[sea_orm(column_type = "Text")]
    pub content: String,

    #[sea_orm(column_type = "Text")]
    pub content_type: String,

    pub size_bytes: i64,

    /// Serialized `DocumentMetadata`
    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: Json,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub failure_reason: Option<String>,

    /// Chunk rows were persisted but their vectors were not
    pub needs_reconciliation: bool,

    pub chunk_count: i32,

    pub processed_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::chunk::Entity")]
    Chunks,
}

impl Related<super::chunk::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Chunks.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Get the status as an enum
    pub fn document_status(&self) -> DocumentStatus {
        DocumentStatus::from(self.status.clone())
    }

    pub fn failure(&self) -> Option<FailureReason> {
        self.failure_reason.as_deref().and_then(FailureReason::parse)
    }

    /// Check if the document is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.document_status(),
            DocumentStatus::Processed | DocumentStatus::Failed
        )
    }
}
