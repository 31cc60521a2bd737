//! Search handlers

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::AppState;
use ragforge_common::{
    auth::TenantContext,
    errors::{AppError, Result},
};
use ragforge_search::{HybridSearchOptions, SearchResult};

/// Search request; unset options fall back to configured defaults
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    /// Missing is treated like empty and rejected by validation
    #[serde(default)]
    pub query: String,
    pub vector_top_k: Option<usize>,
    pub text_top_k: Option<usize>,
    pub min_score: Option<f64>,
    pub vector_weight: Option<f64>,
    pub text_weight: Option<f64>,
    #[serde(default)]
    pub return_context: bool,
    pub max_chunks: Option<usize>,
}

impl SearchRequest {
    fn options(&self, defaults: &HybridSearchOptions) -> HybridSearchOptions {
        HybridSearchOptions {
            vector_top_k: self.vector_top_k.unwrap_or(defaults.vector_top_k),
            text_top_k: self.text_top_k.unwrap_or(defaults.text_top_k),
            min_score: self.min_score.unwrap_or(defaults.min_score),
            vector_weight: self.vector_weight.unwrap_or(defaults.vector_weight),
            text_weight: self.text_weight.unwrap_or(defaults.text_weight),
        }
    }
}

/// Search response: a result list, or a rendered context block
#[derive(Serialize)]
#[serde(untagged)]
pub enum SearchResponse {
    #[serde(rename_all = "camelCase")]
    Results {
        results: Vec<SearchResult>,
        query: String,
        result_count: usize,
    },
    Context {
        context: String,
        query: String,
    },
}

/// Perform a hybrid search
pub async fn search(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    let start = Instant::now();
    let options = request.options(state.search.default_options());

    if let Some(0) = request.max_chunks {
        return Err(AppError::validation("maxChunks", "maxChunks must be at least 1"));
    }

    let response = if request.return_context {
        let context = state
            .search
            .get_hybrid_rag_context(&request.query, &tenant.organization_id, request.max_chunks, Some(&options))
            .await?;
        SearchResponse::Context {
            context,
            query: request.query,
        }
    } else {
        let results = state
            .search
            .hybrid_search(&request.query, &tenant.organization_id, Some(&options))
            .await?;
        SearchResponse::Results {
            result_count: results.len(),
            results,
            query: request.query,
        }
    };

    tracing::info!(
        organization_id = %tenant.organization_id,
        request_id = %tenant.request_id,
        context_mode = request.return_context,
        latency_ms = start.elapsed().as_millis() as u64,
        "Search completed"
    );

    Ok(Json(response))
}
