//! Pinecone-compatible data plane client

use super::{check_dimension, VectorIndex, VectorMatch, VectorQuery, VectorRecord};
use crate::config::VectorIndexConfig;
use crate::db::models::VectorMetadata;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

pub struct PineconeIndex {
    client: reqwest::Client,
    host: String,
    api_key: String,
    namespace: String,
    dimension: usize,
    upsert_batch_size: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpsertRequest<'a> {
    vectors: &'a [VectorRecord],
    namespace: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
    namespace: &'a str,
    filter: serde_json::Value,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<RawMatch>,
}

#[derive(Deserialize)]
struct RawMatch {
    id: String,
    score: f32,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct DeleteRequest<'a> {
    ids: &'a [String],
    namespace: &'a str,
}

impl PineconeIndex {
    pub fn new(config: &VectorIndexConfig, dimension: usize) -> Result<Self> {
        let host = config.host.clone().ok_or_else(|| AppError::Configuration {
            message: "vector_index.host is required for the pinecone provider".to_string(),
        })?;
        let api_key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
            message: "vector_index.api_key is required for the pinecone provider".to_string(),
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            api_key,
            namespace: config.namespace.clone(),
            dimension,
            upsert_batch_size: config.upsert_batch_size.max(1),
        })
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}{}", self.host, path))
            .header("Api-Key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::IndexFailure {
                message: format!("Request to {} failed: {}", path, e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::IndexFailure {
                message: format!("{} returned {}: {}", path, status, body),
            });
        }

        Ok(response)
    }
}

/// Metadata filter sent with every query
fn tenant_filter(organization_id: &str) -> serde_json::Value {
    json!({ "organization_id": { "$eq": organization_id } })
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        for record in records {
            check_dimension(self.dimension, &record.values)?;
        }

        for batch in records.chunks(self.upsert_batch_size) {
            self.post(
                "/vectors/upsert",
                &UpsertRequest {
                    vectors: batch,
                    namespace: &self.namespace,
                },
            )
            .await?;
        }

        Ok(())
    }

    async fn query(&self, query: &VectorQuery) -> Result<Vec<VectorMatch>> {
        let organization_id = query.tenant()?;
        check_dimension(self.dimension, &query.vector)?;

        let request = QueryRequest {
            vector: &query.vector,
            top_k: query.top_k,
            include_metadata: query.include_metadata,
            include_values: false,
            namespace: &self.namespace,
            filter: tenant_filter(organization_id),
        };

        let response: QueryResponse = self
            .post("/query", &request)
            .await?
            .json()
            .await
            .map_err(|e| AppError::IndexFailure {
                message: format!("Failed to parse query response: {}", e),
            })?;

        let mut matches: Vec<VectorMatch> = response
            .matches
            .into_iter()
            .map(|m| VectorMatch {
                id: m.id,
                score: m.score,
                metadata: m
                    .metadata
                    .and_then(|v| serde_json::from_value::<VectorMetadata>(v).ok()),
            })
            .collect();

        // The service already ranks, but callers rely on the ordering
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(matches)
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        self.post(
            "/vectors/delete",
            &DeleteRequest {
                ids,
                namespace: &self.namespace,
            },
        )
        .await?;
        Ok(())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_shape() {
        assert_eq!(
            tenant_filter("org-a"),
            json!({ "organization_id": { "$eq": "org-a" } })
        );
    }

    #[test]
    fn test_query_request_is_camel_case() {
        let request = QueryRequest {
            vector: &[0.5],
            top_k: 3,
            include_metadata: true,
            include_values: false,
            namespace: "",
            filter: tenant_filter("org-a"),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["topK"], 3);
        assert_eq!(json["includeMetadata"], true);
        assert_eq!(json["filter"]["organization_id"]["$eq"], "org-a");
    }

    #[test]
    fn test_requires_host_and_key() {
        let config = VectorIndexConfig {
            provider: "pinecone".to_string(),
            ..VectorIndexConfig::default()
        };
        assert!(matches!(
            PineconeIndex::new(&config, 8),
            Err(AppError::Configuration { .. })
        ));
    }

    #[tokio::test]
    async fn test_dimension_checked_before_network() {
        let config = VectorIndexConfig {
            provider: "pinecone".to_string(),
            host: Some("http://127.0.0.1:9".to_string()),
            api_key: Some("key".to_string()),
            ..VectorIndexConfig::default()
        };
        let index = PineconeIndex::new(&config, 4).unwrap();
        let record = VectorRecord {
            id: "doc-0".to_string(),
            values: vec![0.0; 2],
            metadata: VectorMetadata::new("doc", 0, "org-a", "text"),
        };
        assert!(matches!(
            index.upsert(&[record]).await,
            Err(AppError::DimensionMismatch { expected: 4, actual: 2 })
        ));
    }
}
