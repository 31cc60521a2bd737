//! Vector similarity search
//!
//! Embeds the query, asks the external index for the tenant's nearest
//! neighbours, and hydrates the hits from the document store.

use super::RankedChunk;
use ragforge_common::db::models::ChunkKey;
use ragforge_common::db::DocumentStore;
use ragforge_common::embeddings::Embedder;
use ragforge_common::errors::{AppError, Result};
use ragforge_common::vector::{VectorIndex, VectorMatch, VectorQuery};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

/// Vector retriever over the external ANN index
pub struct VectorRetriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    store: Arc<dyn DocumentStore>,
}

impl VectorRetriever {
    /// Create a new vector retriever. The embedder and index must agree on dimension.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        store: Arc<dyn DocumentStore>,
    ) -> Result<Self> {
        if embedder.dimension() != index.dimension() {
            return Err(AppError::DimensionMismatch {
                expected: index.dimension(),
                actual: embedder.dimension(),
            });
        }
        Ok(Self {
            embedder,
            index,
            store,
        })
    }

    /// Chunk key for a match, or None when it belongs to another tenant
    fn match_key(hit: &VectorMatch, organization_id: &str) -> Option<ChunkKey> {
        match &hit.metadata {
            Some(meta) => {
                if meta.organization_id != organization_id {
                    error!(
                        vector_id = %hit.id,
                        organization_id,
                        "Vector index returned a match from another organization"
                    );
                    return None;
                }
                let document_id = meta.document_id.parse().ok()?;
                Some(ChunkKey::new(document_id, meta.chunk_index))
            }
            None => ChunkKey::from_vector_id(&hit.id),
        }
    }

    /// Top `top_k` chunks for `query` within the organization, best first
    #[instrument(skip_all, fields(organization_id = %organization_id, top_k))]
    pub async fn search(&self, query: &str, organization_id: &str, top_k: usize) -> Result<Vec<RankedChunk>> {
        let embedding = self.embedder.embed(query).await?;
        if embedding.len() != self.index.dimension() {
            return Err(AppError::DimensionMismatch {
                expected: self.index.dimension(),
                actual: embedding.len(),
            });
        }

        let request = VectorQuery::new(embedding, top_k).for_tenant(organization_id);
        let matches = self.index.query(&request).await?;

        let ranked: Vec<(ChunkKey, f64)> = matches
            .iter()
            .filter_map(|hit| Self::match_key(hit, organization_id).map(|key| (key, hit.score as f64)))
            .collect();
        if ranked.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<ChunkKey> = ranked.iter().map(|(key, _)| *key).collect();
        let mut contents: HashMap<ChunkKey, String> = self
            .store
            .get_chunks(organization_id, &keys)
            .await?
            .into_iter()
            .map(|chunk| (chunk.key(), chunk.content))
            .collect();

        let mut chunks = Vec::with_capacity(ranked.len());
        for (key, score) in ranked {
            // A key seen twice in the match list keeps only its first position
            match contents.remove(&key) {
                Some(content) => chunks.push(RankedChunk {
                    key,
                    content,
                    raw_score: score,
                }),
                None if chunks.iter().any(|c: &RankedChunk| c.key == key) => {}
                None => warn!(chunk = %key, "Vector match has no stored chunk, skipping"),
            }
        }

        debug!(matches = matches.len(), hydrated = chunks.len(), "Vector search complete");
        Ok(chunks)
    }
}
