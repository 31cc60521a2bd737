//! Vector index adapter
//!
//! The ANN index is an external managed service consumed through a narrow
//! upsert / query / delete interface:
//! - `PineconeIndex` talks to a Pinecone-compatible data plane over HTTP
//! - `InMemoryVectorIndex` does brute-force cosine similarity for tests
//!
//! Every query must carry an organization filter. A query without one is
//! rejected before it leaves the process.

mod memory;
mod pinecone;

pub use memory::InMemoryVectorIndex;
pub use pinecone::PineconeIndex;

use crate::config::VectorIndexConfig;
use crate::db::models::VectorMetadata;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A vector with its id and search-preview metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: VectorMetadata,
}

/// Mandatory tenant predicate for queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantFilter {
    pub organization_id: String,
}

#[derive(Debug, Clone)]
pub struct VectorQuery {
    pub vector: Vec<f32>,
    pub filter: Option<TenantFilter>,
    pub top_k: usize,
    pub include_metadata: bool,
}

impl VectorQuery {
    pub fn new(vector: Vec<f32>, top_k: usize) -> Self {
        Self {
            vector,
            filter: None,
            top_k,
            include_metadata: true,
        }
    }

    pub fn for_tenant(mut self, organization_id: impl Into<String>) -> Self {
        self.filter = Some(TenantFilter {
            organization_id: organization_id.into(),
        });
        self
    }

    pub fn include_metadata(mut self, include: bool) -> Self {
        self.include_metadata = include;
        self
    }

    /// The organization this query is scoped to, or a tenant isolation violation
    pub fn tenant(&self) -> Result<&str> {
        match &self.filter {
            Some(f) if !f.organization_id.trim().is_empty() => Ok(&f.organization_id),
            _ => {
                tracing::error!(top_k = self.top_k, "Vector query issued without organization filter");
                Err(AppError::TenantIsolationViolation {
                    message: "vector query is missing its organization filter".to_string(),
                })
            }
        }
    }
}

/// A query hit, best first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMatch {
    pub id: String,
    /// Higher is more similar; only the ordering is meaningful
    pub score: f32,
    pub metadata: Option<VectorMetadata>,
}

/// Vector index operations
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace vectors by id
    async fn upsert(&self, records: &[VectorRecord]) -> Result<()>;

    /// Nearest neighbours within the query's tenant, sorted by descending score
    async fn query(&self, query: &VectorQuery) -> Result<Vec<VectorMatch>>;

    /// Delete vectors by id. Unknown ids are not an error.
    async fn delete(&self, ids: &[String]) -> Result<()>;

    /// Dimension every stored and queried vector must have
    fn dimension(&self) -> usize;
}

/// Reject vectors whose length differs from the index dimension
pub(crate) fn check_dimension(expected: usize, vector: &[f32]) -> Result<()> {
    if vector.len() != expected {
        return Err(AppError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// Create a vector index based on configuration
pub fn create_vector_index(config: &VectorIndexConfig, dimension: usize) -> Result<Arc<dyn VectorIndex>> {
    match config.provider.as_str() {
        "pinecone" => Ok(Arc::new(PineconeIndex::new(config, dimension)?)),
        "memory" => Ok(Arc::new(InMemoryVectorIndex::new(dimension))),
        other => Err(AppError::Configuration {
            message: format!("Unknown vector index provider: {}", other),
        }),
    }
}
