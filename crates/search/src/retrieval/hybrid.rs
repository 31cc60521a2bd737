//! Hybrid retrieval combining vector and lexical search
//!
//! Both sides run concurrently. If either fails the whole search fails,
//! tagged with the side that broke; a partial result is never returned.

use super::context::render_context;
use super::fusion::RRFusion;
use super::lexical::LexicalSearch;
use super::vector::VectorRetriever;
use super::{HybridSearchOptions, RankedChunk, SearchResult};
use ragforge_common::config::SearchSettings;
use ragforge_common::errors::{AppError, Result, SearchSide};
use ragforge_common::metrics;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument};

/// Hybrid search engine
pub struct HybridSearchEngine {
    vector: VectorRetriever,
    lexical: Arc<dyn LexicalSearch>,
    fusion_k: f64,
    max_query_chars: usize,
    max_chunks: usize,
    defaults: HybridSearchOptions,
}

impl HybridSearchEngine {
    pub fn new(vector: VectorRetriever, lexical: Arc<dyn LexicalSearch>, settings: &SearchSettings) -> Self {
        Self {
            vector,
            lexical,
            fusion_k: settings.rrf_k,
            max_query_chars: settings.max_query_chars,
            max_chunks: settings.max_chunks,
            defaults: HybridSearchOptions::from(settings),
        }
    }

    /// Options used when a caller supplies none
    pub fn default_options(&self) -> &HybridSearchOptions {
        &self.defaults
    }

    /// Chunks rendered into a context block when a caller supplies no limit
    pub fn default_max_chunks(&self) -> usize {
        self.max_chunks
    }

    /// Fused results for `query`, best first.
    ///
    /// Validation happens before either side is contacted. The fused set
    /// keeps every chunk from both lists whose score reaches `min_score`.
    #[instrument(skip_all, fields(organization_id = %organization_id, query_len = query.len()))]
    pub async fn hybrid_search(
        &self,
        query: &str,
        organization_id: &str,
        options: Option<&HybridSearchOptions>,
    ) -> Result<Vec<SearchResult>> {
        let options = options.unwrap_or(&self.defaults);
        options.validate(query, self.max_query_chars)?;
        if organization_id.trim().is_empty() {
            return Err(AppError::TenantIsolationViolation {
                message: "search is missing its organization".to_string(),
            });
        }

        let start = Instant::now();
        let query = query.trim();

        let vector_side = async {
            self.vector
                .search(query, organization_id, options.vector_top_k)
                .await
                .map_err(|e| AppError::search_failed(SearchSide::Vector, e))
        };
        let text_side = async {
            self.lexical
                .search(query, organization_id, options.text_top_k)
                .await
                .map(|hits| hits.into_iter().map(RankedChunk::from).collect::<Vec<_>>())
                .map_err(|e| AppError::search_failed(SearchSide::Text, e))
        };

        let (vector_hits, text_hits) = match tokio::try_join!(vector_side, text_side) {
            Ok(lists) => lists,
            Err(e) => {
                if let AppError::SearchFailed { side, source } = &e {
                    metrics::record_search_failure(&side.to_string());
                    error!(side = %side, error = %source, "Hybrid search failed");
                }
                return Err(e);
            }
        };

        let vector_count = vector_hits.len();
        let text_count = text_hits.len();

        let fusion = RRFusion::with_weights(options.vector_weight, options.text_weight).with_k(self.fusion_k);
        let results: Vec<SearchResult> = fusion
            .fuse(vector_hits, text_hits)
            .into_iter()
            .filter(|r| r.score >= options.min_score)
            .collect();

        let elapsed = start.elapsed();
        metrics::record_search(elapsed.as_secs_f64(), "hybrid", results.len());
        info!(
            vector_results = vector_count,
            text_results = text_count,
            fused_results = results.len(),
            duration_ms = elapsed.as_millis() as u64,
            "Hybrid search complete"
        );

        Ok(results)
    }

    /// Hybrid search rendered as a prompt context block
    pub async fn get_hybrid_rag_context(
        &self,
        query: &str,
        organization_id: &str,
        max_chunks: Option<usize>,
        options: Option<&HybridSearchOptions>,
    ) -> Result<String> {
        let results = self.hybrid_search(query, organization_id, options).await?;
        Ok(render_context(&results, max_chunks.unwrap_or(self.max_chunks)))
    }
}
