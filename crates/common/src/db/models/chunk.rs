//! Chunk entity
//!
//! A contiguous slice of a document. `(document_id, chunk_index)` is the
//! natural key; the vector index id is derived from it.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "chunks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Denormalized for tenant-scoped queries
    #[sea_orm(column_type = "Text", indexed)]
    pub organization_id: String,

    pub document_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub content: String,

    /// Zero-based, contiguous within a document
    pub chunk_index: i32,

    /// Token count for context budgeting
    pub token_count: i32,

    /// Vectors live in the external index, so this stays NULL
    #[sea_orm(column_type = "Text", nullable)]
    pub embedding: Option<String>,

    /// Serialized `Metadata::Ingestion`
    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: Json,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::document::Entity",
        from = "Column::DocumentId",
        to = "super::document::Column::Id",
        on_delete = "Cascade"
    )]
    Document,
}

impl Related<super::document::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Document.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn key(&self) -> ChunkKey {
        ChunkKey::new(self.document_id, self.chunk_index)
    }
}

/// Natural identity of a chunk
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkKey {
    pub document_id: Uuid,
    pub chunk_index: i32,
}

impl ChunkKey {
    pub fn new(document_id: Uuid, chunk_index: i32) -> Self {
        Self {
            document_id,
            chunk_index,
        }
    }

    /// Id of the chunk's vector in the external index
    pub fn vector_id(&self) -> String {
        vector_id(self.document_id, self.chunk_index)
    }

    /// Parse a `{document_id}-{chunk_index}` vector id
    pub fn from_vector_id(id: &str) -> Option<Self> {
        let (doc, idx) = id.rsplit_once('-')?;
        Some(Self {
            document_id: Uuid::parse_str(doc).ok()?,
            chunk_index: idx.parse().ok()?,
        })
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.document_id, self.chunk_index)
    }
}

/// Deterministic vector id for a chunk
pub fn vector_id(document_id: Uuid, chunk_index: i32) -> String {
    format!("{}-{}", document_id, chunk_index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_id_format() {
        let doc = Uuid::parse_str("6f1c1f0e-8d2a-4c61-9b43-2f0f1d6d7b10").unwrap();
        let key = ChunkKey::new(doc, 2);
        assert_eq!(key.vector_id(), "6f1c1f0e-8d2a-4c61-9b43-2f0f1d6d7b10-2");
        assert_eq!(ChunkKey::from_vector_id(&key.vector_id()), Some(key));
    }

    #[test]
    fn test_malformed_vector_id() {
        assert_eq!(ChunkKey::from_vector_id("no-dash-uuid-x"), None);
        assert_eq!(ChunkKey::from_vector_id("plain"), None);
    }
}
