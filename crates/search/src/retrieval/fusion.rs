//! Reciprocal Rank Fusion (RRF) for combining search results
//!
//! Each list contributes `weight / (k + rank)` for every chunk it holds,
//! rank being 1-based. A chunk's fused score is the sum over both lists.
//! Scores are left un-normalized so they stay comparable across queries.

use super::{RankedChunk, SearchResult, SearchSource};
use ragforge_common::db::models::ChunkKey;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Standard RRF smoothing constant
pub const DEFAULT_RRF_K: f64 = 60.0;

/// RRF fusion parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RRFusion {
    /// Constant k (typically 60)
    pub k: f64,

    /// Weight for vector results
    pub vector_weight: f64,

    /// Weight for lexical results
    pub text_weight: f64,
}

impl Default for RRFusion {
    fn default() -> Self {
        Self {
            k: DEFAULT_RRF_K,
            vector_weight: 0.7,
            text_weight: 0.3,
        }
    }
}

struct Entry {
    content: String,
    vector_rank: Option<usize>,
    text_rank: Option<usize>,
}

impl RRFusion {
    /// Create with custom weights
    pub fn with_weights(vector_weight: f64, text_weight: f64) -> Self {
        Self {
            vector_weight,
            text_weight,
            ..Self::default()
        }
    }

    pub fn with_k(mut self, k: f64) -> Self {
        self.k = k;
        self
    }

    fn contribution(&self, weight: f64, rank: Option<usize>) -> f64 {
        rank.map(|r| weight / (self.k + r as f64)).unwrap_or(0.0)
    }

    /// Fuse two rank-ordered lists (best first) into one ordered result set.
    ///
    /// Duplicates within a list keep their best position. Ordering is by
    /// fused score, then `both` before single-source, then best rank, then
    /// chunk identity, so equal inputs always give equal output.
    pub fn fuse(&self, vector: Vec<RankedChunk>, text: Vec<RankedChunk>) -> Vec<SearchResult> {
        let mut entries: HashMap<ChunkKey, Entry> = HashMap::new();

        for (rank, chunk) in dedup(vector).into_iter().enumerate() {
            entries.insert(
                chunk.key,
                Entry {
                    content: chunk.content,
                    vector_rank: Some(rank + 1),
                    text_rank: None,
                },
            );
        }

        for (rank, chunk) in dedup(text).into_iter().enumerate() {
            entries
                .entry(chunk.key)
                .and_modify(|e| e.text_rank = Some(rank + 1))
                .or_insert(Entry {
                    content: chunk.content,
                    vector_rank: None,
                    text_rank: Some(rank + 1),
                });
        }

        let mut results: Vec<SearchResult> = entries
            .into_iter()
            .map(|(key, entry)| {
                let score = self.contribution(self.vector_weight, entry.vector_rank)
                    + self.contribution(self.text_weight, entry.text_rank);
                let source = match (entry.vector_rank, entry.text_rank) {
                    (Some(_), Some(_)) => SearchSource::Both,
                    (Some(_), None) => SearchSource::Vector,
                    _ => SearchSource::Text,
                };
                SearchResult {
                    document_id: key.document_id,
                    chunk_index: key.chunk_index,
                    content: entry.content,
                    score,
                    source,
                    vector_rank: entry.vector_rank,
                    text_rank: entry.text_rank,
                }
            })
            .collect();

        results.sort_by(compare);
        results
    }
}

fn dedup(list: Vec<RankedChunk>) -> Vec<RankedChunk> {
    let mut seen = std::collections::HashSet::with_capacity(list.len());
    list.into_iter().filter(|c| seen.insert(c.key)).collect()
}

fn compare(a: &SearchResult, b: &SearchResult) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| {
            let a_both = a.source == SearchSource::Both;
            let b_both = b.source == SearchSource::Both;
            b_both.cmp(&a_both)
        })
        .then_with(|| a.best_rank().cmp(&b.best_rank()))
        .then_with(|| a.key().cmp(&b.key()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn chunk(id: u128) -> RankedChunk {
        RankedChunk {
            key: ChunkKey::new(Uuid::from_u128(id), 0),
            content: format!("chunk {}", id),
            raw_score: 1.0,
        }
    }

    const A: u128 = 1;
    const B: u128 = 2;
    const C: u128 = 3;
    const D: u128 = 4;

    fn ids(results: &[SearchResult]) -> Vec<u128> {
        results.iter().map(|r| r.document_id.as_u128()).collect()
    }

    #[test]
    fn test_chunk_in_both_lists_ranks_first() {
        // Vector: [A, B, C], lexical: [B, D]
        let fusion = RRFusion::default();
        let results = fusion.fuse(vec![chunk(A), chunk(B), chunk(C)], vec![chunk(B), chunk(D)]);

        assert_eq!(results.len(), 4);
        assert_eq!(ids(&results), vec![B, A, C, D]);

        let b = &results[0];
        assert_eq!(b.source, SearchSource::Both);
        let expected = 0.7 / 62.0 + 0.3 / 61.0;
        assert!((b.score - expected).abs() < 1e-12);
        assert!((b.score - 0.01621).abs() < 1e-5);

        assert_eq!(results[1].source, SearchSource::Vector);
        assert!((results[1].score - 0.7 / 61.0).abs() < 1e-12);
        assert_eq!(results[3].source, SearchSource::Text);
        assert!((results[3].score - 0.3 / 62.0).abs() < 1e-12);
    }

    #[test]
    fn test_fusion_is_deterministic() {
        let fusion = RRFusion::with_weights(0.5, 0.5);
        let vector: Vec<RankedChunk> = (1..=20).map(chunk).collect();
        let text: Vec<RankedChunk> = (10..=30).rev().map(chunk).collect();

        let first = fusion.fuse(vector.clone(), text.clone());
        for _ in 0..5 {
            assert_eq!(fusion.fuse(vector.clone(), text.clone()), first);
        }
    }

    #[test]
    fn test_duplicates_within_list_keep_best_rank() {
        let fusion = RRFusion::default();
        let results = fusion.fuse(vec![chunk(A), chunk(B), chunk(A)], vec![]);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].vector_rank, Some(1));
        assert_eq!(results[1].vector_rank, Some(2));
    }

    #[test]
    fn test_tie_prefers_both_then_best_rank() {
        // Equal weights: A at vector rank 1 alone equals B at text rank 1 alone
        let fusion = RRFusion::with_weights(0.5, 0.5);
        let results = fusion.fuse(vec![chunk(B)], vec![chunk(A)]);
        assert_eq!(results[0].score, results[1].score);
        // Same source class and rank, identity decides
        assert_eq!(ids(&results), vec![A, B]);

        // k = 0: D at ranks (2, 2) scores 1.0, same as A and C at rank 1
        let fusion = RRFusion { k: 0.0, vector_weight: 1.0, text_weight: 1.0 };
        let results = fusion.fuse(vec![chunk(A), chunk(D)], vec![chunk(C), chunk(D)]);
        let d = results.iter().position(|r| r.document_id.as_u128() == D).unwrap();
        let a = results.iter().position(|r| r.document_id.as_u128() == A).unwrap();
        assert_eq!(results[d].score, results[a].score);
        assert!(d < a);
    }

    #[test]
    fn test_empty_lists() {
        assert!(RRFusion::default().fuse(vec![], vec![]).is_empty());
    }

    #[test]
    fn test_zero_weight_side_still_tags_source() {
        let fusion = RRFusion::with_weights(1.0, 0.0);
        let results = fusion.fuse(vec![chunk(A)], vec![chunk(A), chunk(B)]);
        assert_eq!(results[0].source, SearchSource::Both);
        assert_eq!(results[1].score, 0.0);
    }
}
