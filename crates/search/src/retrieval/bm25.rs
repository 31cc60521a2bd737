//! BM25 lexical search over the in-memory document store
//!
//! Stands in for Postgres full-text search when running without a database.

use super::lexical::{require_tenant, LexicalHit, LexicalSearch};
use ragforge_common::db::InMemoryDocumentStore;
use ragforge_common::errors::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Term frequency saturation
const K1: f64 = 1.2;
/// Length normalization
const B: f64 = 0.75;

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

pub struct InMemoryLexicalSearch {
    store: Arc<InMemoryDocumentStore>,
}

impl InMemoryLexicalSearch {
    pub fn new(store: Arc<InMemoryDocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl LexicalSearch for InMemoryLexicalSearch {
    async fn search(&self, query: &str, organization_id: &str, top_k: usize) -> Result<Vec<LexicalHit>> {
        require_tenant(organization_id)?;

        let terms: HashSet<String> = tokenize(query).into_iter().collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let chunks = self.store.searchable_chunks(organization_id).await;
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let docs: Vec<Vec<String>> = chunks.iter().map(|c| tokenize(&c.content)).collect();
        let n = docs.len() as f64;
        let avg_len = docs.iter().map(Vec::len).sum::<usize>() as f64 / n;

        let mut df: HashMap<&str, usize> = HashMap::new();
        for doc in &docs {
            let unique: HashSet<&str> = doc.iter().map(String::as_str).collect();
            for term in unique.into_iter().filter(|t| terms.contains(*t)) {
                *df.entry(term).or_default() += 1;
            }
        }

        let mut hits: Vec<LexicalHit> = chunks
            .into_iter()
            .zip(&docs)
            .filter_map(|(chunk, doc)| {
                let len = doc.len() as f64;
                let mut tf: HashMap<&str, usize> = HashMap::new();
                for token in doc.iter().filter(|t| terms.contains(*t)) {
                    *tf.entry(token.as_str()).or_default() += 1;
                }

                let score: f64 = tf
                    .iter()
                    .map(|(term, &freq)| {
                        let docs_with_term = df.get(term).copied().unwrap_or(0) as f64;
                        let idf = ((n - docs_with_term + 0.5) / (docs_with_term + 0.5) + 1.0).ln();
                        let freq = freq as f64;
                        idf * freq * (K1 + 1.0) / (freq + K1 * (1.0 - B + B * len / avg_len.max(1.0)))
                    })
                    .sum();

                (score > 0.0).then(|| LexicalHit {
                    chunk_id: chunk.id,
                    document_id: chunk.document_id,
                    chunk_index: chunk.chunk_index,
                    content: chunk.content,
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.document_id.cmp(&b.document_id))
                .then_with(|| a.chunk_index.cmp(&b.chunk_index))
        });
        hits.truncate(top_k);
        Ok(hits)
    }
}
