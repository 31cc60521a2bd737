//! Brute-force in-memory vector index

use super::{check_dimension, VectorIndex, VectorMatch, VectorQuery, VectorRecord};
use crate::errors::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

pub struct InMemoryVectorIndex {
    dimension: usize,
    records: RwLock<HashMap<String, VectorRecord>>,
}

impl InMemoryVectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            records: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.records.read().await.contains_key(id)
    }

    /// Ids currently stored, sorted
    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.records.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        // Validate everything before writing anything
        for record in records {
            check_dimension(self.dimension, &record.values)?;
        }

        let mut store = self.records.write().await;
        for record in records {
            store.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn query(&self, query: &VectorQuery) -> Result<Vec<VectorMatch>> {
        let organization_id = query.tenant()?;
        check_dimension(self.dimension, &query.vector)?;

        let store = self.records.read().await;
        let mut matches: Vec<VectorMatch> = store
            .values()
            .filter(|r| r.metadata.organization_id == organization_id)
            .map(|r| VectorMatch {
                id: r.id.clone(),
                score: cosine_sim(&query.vector, &r.values),
                metadata: query.include_metadata.then(|| r.metadata.clone()),
            })
            .collect();

        matches.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        matches.truncate(query.top_k);
        Ok(matches)
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        let mut store = self.records.write().await;
        for id in ids {
            store.remove(id);
        }
        Ok(())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::VectorMetadata;
    use crate::errors::AppError;

    fn record(id: &str, org: &str, values: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            values,
            metadata: VectorMetadata::new("doc", 0, org, "preview"),
        }
    }

    #[tokio::test]
    async fn test_query_sorted_by_descending_similarity() {
        let index = InMemoryVectorIndex::new(2);
        index
            .upsert(&[
                record("far", "org-a", vec![0.0, 1.0]),
                record("near", "org-a", vec![1.0, 0.1]),
                record("mid", "org-a", vec![1.0, 1.0]),
            ])
            .await
            .unwrap();

        let query = VectorQuery::new(vec![1.0, 0.0], 10).for_tenant("org-a");
        let ids: Vec<String> = index.query(&query).await.unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["near", "mid", "far"]);
    }

    #[tokio::test]
    async fn test_query_is_tenant_scoped() {
        let index = InMemoryVectorIndex::new(2);
        index
            .upsert(&[
                record("a", "org-a", vec![1.0, 0.0]),
                record("b", "org-b", vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let query = VectorQuery::new(vec![1.0, 0.0], 10).for_tenant("org-b");
        let matches = index.query(&query).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "b");
        assert_eq!(matches[0].metadata.as_ref().unwrap().organization_id, "org-b");
    }

    #[tokio::test]
    async fn test_unfiltered_query_rejected() {
        let index = InMemoryVectorIndex::new(2);
        let query = VectorQuery::new(vec![1.0, 0.0], 10);
        assert!(matches!(
            index.query(&query).await,
            Err(AppError::TenantIsolationViolation { .. })
        ));
    }

    #[tokio::test]
    async fn test_wrong_dimension_upsert_rejected() {
        let index = InMemoryVectorIndex::new(3);
        let result = index
            .upsert(&[
                record("ok", "org-a", vec![1.0, 0.0, 0.0]),
                record("bad", "org-a", vec![1.0, 0.0]),
            ])
            .await;

        assert!(matches!(
            result,
            Err(AppError::DimensionMismatch { expected: 3, actual: 2 })
        ));
        assert!(index.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_missing_id_is_ok() {
        let index = InMemoryVectorIndex::new(2);
        index.upsert(&[record("a", "org-a", vec![1.0, 0.0])]).await.unwrap();
        index
            .delete(&["a".to_string(), "ghost".to_string()])
            .await
            .unwrap();
        assert!(!index.contains("a").await);
    }

    #[tokio::test]
    async fn test_metadata_omitted_when_not_requested() {
        let index = InMemoryVectorIndex::new(2);
        index.upsert(&[record("a", "org-a", vec![1.0, 0.0])]).await.unwrap();
        let query = VectorQuery::new(vec![1.0, 0.0], 1)
            .for_tenant("org-a")
            .include_metadata(false);
        assert!(index.query(&query).await.unwrap()[0].metadata.is_none());
    }
}
