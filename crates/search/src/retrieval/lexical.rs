//! Lexical search using PostgreSQL full-text search
//!
//! Ranks chunks with `ts_rank_cd` over an english `tsvector`. Scores are
//! returned raw; fusion only looks at the order.

use ragforge_common::db::DbPool;
use ragforge_common::errors::{AppError, Result};
use async_trait::async_trait;
use sea_orm::{DbBackend, FromQueryResult, Statement};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// A lexical match, best first
#[derive(Debug, Clone, PartialEq, Serialize, FromQueryResult)]
#[serde(rename_all = "camelCase")]
pub struct LexicalHit {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub chunk_index: i32,
    pub content: String,
    pub score: f64,
}

/// Keyword search over stored chunks
#[async_trait]
pub trait LexicalSearch: Send + Sync {
    /// Up to `top_k` chunks of the organization matching `query`, best first
    async fn search(&self, query: &str, organization_id: &str, top_k: usize) -> Result<Vec<LexicalHit>>;
}

pub(crate) fn require_tenant(organization_id: &str) -> Result<()> {
    if organization_id.trim().is_empty() {
        tracing::error!("Lexical search issued without organization filter");
        return Err(AppError::TenantIsolationViolation {
            message: "lexical search is missing its organization filter".to_string(),
        });
    }
    Ok(())
}

const LEXICAL_SQL: &str = r#"
    SELECT
        c.id AS chunk_id,
        c.document_id,
        c.chunk_index,
        c.content,
        ts_rank_cd(
            to_tsvector('english', c.content),
            plainto_tsquery('english', $1)
        )::float8 AS score
    FROM chunks c
    JOIN documents d ON d.id = c.document_id
    WHERE c.organization_id = $2
      AND NOT d.needs_reconciliation
      AND to_tsvector('english', c.content) @@ plainto_tsquery('english', $1)
    ORDER BY score DESC, c.document_id, c.chunk_index
    LIMIT $3
"#;

/// Postgres full-text search over the `chunks` table
pub struct PostgresLexicalSearch {
    db: Arc<DbPool>,
}

impl PostgresLexicalSearch {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LexicalSearch for PostgresLexicalSearch {
    #[instrument(skip_all, fields(organization_id = %organization_id, top_k))]
    async fn search(&self, query: &str, organization_id: &str, top_k: usize) -> Result<Vec<LexicalHit>> {
        require_tenant(organization_id)?;

        let statement = Statement::from_sql_and_values(
            DbBackend::Postgres,
            LEXICAL_SQL,
            [
                query.to_string().into(),
                organization_id.to_string().into(),
                (top_k as i64).into(),
            ],
        );

        let hits = LexicalHit::find_by_statement(statement)
            .all(self.db.read())
            .await
            .map_err(|e| AppError::LexicalSearchFailure {
                message: format!("full-text query failed: {}", e),
            })?;

        debug!(hits = hits.len(), "Lexical search complete");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_tenant_rejected() {
        assert!(matches!(
            require_tenant("  "),
            Err(AppError::TenantIsolationViolation { .. })
        ));
        assert!(require_tenant("org-a").is_ok());
    }

    #[test]
    fn test_query_is_tenant_filtered_and_ordered() {
        assert!(LEXICAL_SQL.contains("c.organization_id = $2"));
        assert!(LEXICAL_SQL.contains("NOT d.needs_reconciliation"));
        assert!(LEXICAL_SQL.contains("ORDER BY score DESC, c.document_id, c.chunk_index"));
    }
}
