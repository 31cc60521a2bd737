//! Typed metadata payloads
//!
//! Chunk and vector metadata used to be free-form maps. They are now a
//! small tagged union of the shapes actually produced:
//! - `ingestion`: written by the pipeline next to every chunk row
//! - `search_preview`: stored alongside every vector in the index
//!
//! Only [`DocumentMetadata::provider`] stays open-ended, for passthrough
//! fields that belong to whatever system uploaded the document.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Characters of chunk content kept in a vector's preview
pub const PREVIEW_CHARS: usize = 200;

/// Metadata recorded for each persisted chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Character offset of the chunk start in the source document
    pub char_start: usize,

    /// Character offset one past the chunk end
    pub char_end: usize,

    /// SHA-256 hex digest of the chunk content
    pub content_hash: String,
}

impl ChunkMetadata {
    pub fn new(char_start: usize, char_end: usize, content: &str) -> Self {
        Self {
            char_start,
            char_end,
            content_hash: content_hash(content),
        }
    }
}

/// Metadata carried with each vector in the external index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorMetadata {
    pub document_id: String,
    pub chunk_index: i32,
    pub organization_id: String,
    /// Leading characters of the chunk, for display without a store lookup
    pub preview: String,
}

impl VectorMetadata {
    pub fn new(document_id: &str, chunk_index: i32, organization_id: &str, content: &str) -> Self {
        Self {
            document_id: document_id.to_string(),
            chunk_index,
            organization_id: organization_id.to_string(),
            preview: content.chars().take(PREVIEW_CHARS).collect(),
        }
    }
}

/// Tagged union of the known metadata shapes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Metadata {
    Ingestion(ChunkMetadata),
    SearchPreview(VectorMetadata),
}

impl Metadata {
    pub fn as_ingestion(&self) -> Option<&ChunkMetadata> {
        match self {
            Metadata::Ingestion(m) => Some(m),
            Metadata::SearchPreview(_) => None,
        }
    }

    pub fn as_search_preview(&self) -> Option<&VectorMetadata> {
        match self {
            Metadata::SearchPreview(m) => Some(m),
            Metadata::Ingestion(_) => None,
        }
    }
}

/// Document-level metadata supplied at upload time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Where the document came from (upload, url, integration name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Provider-specific passthrough fields
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub provider: BTreeMap<String, serde_json::Value>,
}

/// SHA-256 hex digest of a piece of content
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_is_tagged() {
        let meta = Metadata::Ingestion(ChunkMetadata::new(0, 5, "hello"));
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["kind"], "ingestion");
        assert_eq!(json["char_end"], 5);

        let back: Metadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn test_accessors_match_variant() {
        let chunk = Metadata::Ingestion(ChunkMetadata::new(2, 9, "content"));
        assert_eq!(chunk.as_ingestion().map(|m| m.char_start), Some(2));
        assert!(chunk.as_search_preview().is_none());

        let vector = Metadata::SearchPreview(VectorMetadata::new("doc", 3, "org", "text"));
        assert_eq!(vector.as_search_preview().map(|m| m.chunk_index), Some(3));
        assert!(vector.as_ingestion().is_none());
    }

    #[test]
    fn test_preview_is_truncated_on_char_boundary() {
        let content = "é".repeat(300);
        let meta = VectorMetadata::new("doc", 0, "org", &content);
        assert_eq!(meta.preview.chars().count(), PREVIEW_CHARS);
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let json = serde_json::json!({ "kind": "something_else" });
        assert!(serde_json::from_value::<Metadata>(json).is_err());
    }

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
        assert_eq!(content_hash("").len(), 64);
    }
}
