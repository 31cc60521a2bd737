//! Hybrid retrieval system
//!
//! Provides:
//! - Vector search (query embedding → tenant-filtered ANN query → chunk hydration)
//! - Lexical search (Postgres full-text, or BM25 over the in-memory store)
//! - Hybrid search (RRF fusion of both, run concurrently)
//! - Context rendering for prompt injection

mod bm25;
mod context;
mod fusion;
mod hybrid;
mod lexical;
mod vector;

pub use bm25::InMemoryLexicalSearch;
pub use context::{render_context, CONTEXT_DELIMITER, NO_RELEVANT_CONTEXT};
pub use fusion::RRFusion;
pub use hybrid::HybridSearchEngine;
pub use lexical::{LexicalHit, LexicalSearch, PostgresLexicalSearch};
pub use vector::VectorRetriever;

use ragforge_common::config::SearchSettings;
use ragforge_common::db::models::ChunkKey;
use ragforge_common::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound for per-side result counts
pub const MAX_TOP_K: usize = 100;

/// Which result lists a fused chunk came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchSource {
    Vector,
    Text,
    Both,
}

/// A chunk at a position in one adapter's result list
#[derive(Debug, Clone, PartialEq)]
pub struct RankedChunk {
    pub key: ChunkKey,
    pub content: String,
    /// The adapter's own score; only its ordering matters
    pub raw_score: f64,
}

impl From<LexicalHit> for RankedChunk {
    fn from(hit: LexicalHit) -> Self {
        Self {
            key: ChunkKey::new(hit.document_id, hit.chunk_index),
            content: hit.content,
            raw_score: hit.score,
        }
    }
}

/// A fused search result. Built per query, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub document_id: Uuid,
    pub chunk_index: i32,
    pub content: String,
    pub score: f64,
    pub source: SearchSource,

    /// 1-based rank in the vector list
    #[serde(skip)]
    pub vector_rank: Option<usize>,

    /// 1-based rank in the lexical list
    #[serde(skip)]
    pub text_rank: Option<usize>,
}

impl SearchResult {
    pub fn key(&self) -> ChunkKey {
        ChunkKey::new(self.document_id, self.chunk_index)
    }

    /// Best (lowest) rank across both lists
    pub fn best_rank(&self) -> usize {
        match (self.vector_rank, self.text_rank) {
            (Some(v), Some(t)) => v.min(t),
            (Some(r), None) | (None, Some(r)) => r,
            (None, None) => usize::MAX,
        }
    }
}

/// Per-query knobs for hybrid search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HybridSearchOptions {
    pub vector_top_k: usize,
    pub text_top_k: usize,
    pub min_score: f64,
    pub vector_weight: f64,
    pub text_weight: f64,
}

impl Default for HybridSearchOptions {
    fn default() -> Self {
        Self {
            vector_top_k: 20,
            text_top_k: 20,
            min_score: 0.0,
            vector_weight: 0.7,
            text_weight: 0.3,
        }
    }
}

impl From<&SearchSettings> for HybridSearchOptions {
    fn from(settings: &SearchSettings) -> Self {
        Self {
            vector_top_k: settings.vector_top_k,
            text_top_k: settings.text_top_k,
            min_score: settings.min_score,
            vector_weight: settings.vector_weight,
            text_weight: settings.text_weight,
        }
    }
}

impl HybridSearchOptions {
    /// Validate the query and options. Runs before any network call.
    pub fn validate(&self, query: &str, max_query_chars: usize) -> Result<()> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(AppError::validation("query", "query must not be empty"));
        }
        let chars = trimmed.chars().count();
        if chars > max_query_chars {
            return Err(AppError::validation(
                "query",
                format!("query must be at most {} characters, got {}", max_query_chars, chars),
            ));
        }

        for (field, value) in [("vectorTopK", self.vector_top_k), ("textTopK", self.text_top_k)] {
            if value == 0 || value > MAX_TOP_K {
                return Err(AppError::validation(
                    field,
                    format!("{} must be between 1 and {}", field, MAX_TOP_K),
                ));
            }
        }

        if !(0.0..=1.0).contains(&self.min_score) {
            return Err(AppError::validation("minScore", "minScore must be within [0, 1]"));
        }

        for (field, value) in [("vectorWeight", self.vector_weight), ("textWeight", self.text_weight)] {
            if !value.is_finite() || value < 0.0 {
                return Err(AppError::validation(
                    field,
                    format!("{} must be a non-negative number", field),
                ));
            }
        }
        if self.vector_weight == 0.0 && self.text_weight == 0.0 {
            return Err(AppError::validation(
                "vectorWeight",
                "vectorWeight and textWeight cannot both be zero",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_defaults_are_valid() {
        assert_ok!(HybridSearchOptions::default().validate("rust", 500));
    }

    #[test]
    fn test_query_bounds() {
        let options = HybridSearchOptions::default();
        assert_err!(options.validate("", 500));
        assert_err!(options.validate("   ", 500));
        assert_ok!(options.validate(&"a".repeat(500), 500));
        assert_err!(options.validate(&"a".repeat(501), 500));
        // Counted in characters, not bytes
        assert_ok!(options.validate(&"é".repeat(500), 500));
    }

    #[test]
    fn test_option_bounds() {
        let bad = [
            HybridSearchOptions { vector_top_k: 0, ..Default::default() },
            HybridSearchOptions { text_top_k: 101, ..Default::default() },
            HybridSearchOptions { min_score: 1.5, ..Default::default() },
            HybridSearchOptions { min_score: -0.1, ..Default::default() },
            HybridSearchOptions { vector_weight: -1.0, ..Default::default() },
            HybridSearchOptions { text_weight: f64::NAN, ..Default::default() },
            HybridSearchOptions { vector_weight: 0.0, text_weight: 0.0, ..Default::default() },
        ];
        for options in bad {
            let err = options.validate("query", 500).unwrap_err();
            assert!(matches!(err, AppError::Validation { .. }), "{:?}", options);
        }
    }

    #[test]
    fn test_best_rank() {
        let mut result = SearchResult {
            document_id: Uuid::nil(),
            chunk_index: 0,
            content: String::new(),
            score: 0.0,
            source: SearchSource::Both,
            vector_rank: Some(3),
            text_rank: Some(1),
        };
        assert_eq!(result.best_rank(), 1);
        result.text_rank = None;
        assert_eq!(result.best_rank(), 3);
    }
}
