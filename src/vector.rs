//! Vector index client abstraction.
//!
//! The [`VectorIndex`] trait covers everything the pipeline needs from a
//! similarity-search service: collection setup, bulk upsert, metadata-
//! filtered nearest-neighbor search, and per-document deletion. The
//! document filter is part of the `search` signature on purpose — it is
//! the sole isolation mechanism between documents, and an unfiltered
//! query must not be expressible.
//!
//! Implementations:
//! - **[`QdrantIndex`]** — a remote Qdrant collection over its REST API.
//! - **[`MemoryIndex`]** — brute-force cosine in process, for tests and
//!   local runs without an index service.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::RwLock;
use std::time::Duration;

use crate::config::VectorConfig;
use crate::embedding::cosine_similarity;
use crate::models::{RecordPayload, ScoredRecord, VectorRecord};

const QDRANT_API_KEY_ENV: &str = "QDRANT_API_KEY";

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the backing collection and payload index if missing.
    async fn ensure_ready(&self, dims: usize) -> Result<()>;

    /// Write records in bulk. Record ids are stable per chunk, so a
    /// repeated upsert overwrites rather than duplicates.
    async fn upsert(&self, records: &[VectorRecord]) -> Result<()>;

    /// Nearest-neighbor search restricted to one document's records.
    async fn search(
        &self,
        vector: &[f32],
        document_id: &str,
        limit: usize,
    ) -> Result<Vec<ScoredRecord>>;

    /// Remove every record tagged with the document id.
    async fn delete_document(&self, document_id: &str) -> Result<()>;
}

/// Create the configured [`VectorIndex`] implementation.
pub fn create_index(config: &VectorConfig) -> Result<Box<dyn VectorIndex>> {
    match config.provider.as_str() {
        "memory" => Ok(Box::new(MemoryIndex::new())),
        "qdrant" => Ok(Box::new(QdrantIndex::new(config)?)),
        other => bail!("Unknown vector index provider: {}", other),
    }
}

// ============ Qdrant ============

/// Remote Qdrant collection accessed over REST.
pub struct QdrantIndex {
    base: String,
    collection: String,
    client: reqwest::Client,
    api_key: Option<String>,
}

/// Points written per upsert call, to bound request size.
const UPSERT_BATCH: usize = 100;

impl QdrantIndex {
    pub fn new(config: &VectorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            base: config.url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            client,
            api_key: std::env::var(QDRANT_API_KEY_ENV).ok(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .request(method, format!("{}{}", self.base, path));
        if let Some(key) = &self.api_key {
            req = req.header("api-key", key);
        }
        req
    }

    fn document_filter(document_id: &str) -> serde_json::Value {
        serde_json::json!({
            "must": [
                { "key": "documentId", "match": { "value": document_id } }
            ]
        })
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn ensure_ready(&self, dims: usize) -> Result<()> {
        let path = format!("/collections/{}", self.collection);
        let exists = self
            .request(reqwest::Method::GET, &path)
            .send()
            .await?
            .status()
            .is_success();

        if !exists {
            let body = serde_json::json!({
                "vectors": { "size": dims, "distance": "Cosine" }
            });
            let resp = self
                .request(reqwest::Method::PUT, &path)
                .json(&body)
                .send()
                .await?;
            if !resp.status().is_success() {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                bail!("Qdrant collection create failed {}: {}", status, text);
            }
        }

        // Keyword index on the document tag so filtered queries stay fast.
        let body = serde_json::json!({
            "field_name": "documentId",
            "field_schema": "keyword"
        });
        let resp = self
            .request(reqwest::Method::PUT, &format!("{}/index", path))
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            tracing::warn!(collection = %self.collection, %text, "payload index request rejected");
        }

        Ok(())
    }

    async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        for batch in records.chunks(UPSERT_BATCH) {
            let points: Vec<serde_json::Value> = batch
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "id": r.id,
                        "vector": r.vector,
                        "payload": r.payload,
                    })
                })
                .collect();

            let resp = self
                .request(
                    reqwest::Method::PUT,
                    &format!("/collections/{}/points?wait=true", self.collection),
                )
                .json(&serde_json::json!({ "points": points }))
                .send()
                .await?;

            if !resp.status().is_success() {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                bail!("Qdrant upsert failed {}: {}", status, text);
            }
        }

        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        document_id: &str,
        limit: usize,
    ) -> Result<Vec<ScoredRecord>> {
        let body = serde_json::json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
            "filter": Self::document_filter(document_id),
        });

        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("/collections/{}/points/search", self.collection),
            )
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("Qdrant search failed {}: {}", status, text);
        }

        let json: serde_json::Value = resp.json().await?;
        let hits = json
            .get("result")
            .and_then(|r| r.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid Qdrant response: missing result array"))?;

        let mut records = Vec::with_capacity(hits.len());
        for hit in hits {
            let score = hit.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0) as f32;
            let payload = hit
                .get("payload")
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("Invalid Qdrant response: hit without payload"))?;
            let payload: RecordPayload = serde_json::from_value(payload)?;
            records.push(ScoredRecord { score, payload });
        }

        Ok(records)
    }

    async fn delete_document(&self, document_id: &str) -> Result<()> {
        let body = serde_json::json!({ "filter": Self::document_filter(document_id) });

        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("/collections/{}/points/delete?wait=true", self.collection),
            )
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("Qdrant delete failed {}: {}", status, text);
        }

        Ok(())
    }
}

// ============ In-memory ============

/// In-process index for tests and local runs. Search is brute-force
/// cosine similarity over all records carrying the requested document id.
pub struct MemoryIndex {
    records: RwLock<Vec<VectorRecord>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn ensure_ready(&self, _dims: usize) -> Result<()> {
        Ok(())
    }

    async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        let mut stored = self.records.write().unwrap();
        for record in records {
            stored.retain(|r| r.id != record.id);
            stored.push(record.clone());
        }
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        document_id: &str,
        limit: usize,
    ) -> Result<Vec<ScoredRecord>> {
        let stored = self.records.read().unwrap();
        let mut hits: Vec<ScoredRecord> = stored
            .iter()
            .filter(|r| r.payload.document_id == document_id)
            .map(|r| ScoredRecord {
                score: cosine_similarity(vector, &r.vector),
                payload: r.payload.clone(),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn delete_document(&self, document_id: &str) -> Result<()> {
        let mut stored = self.records.write().unwrap();
        stored.retain(|r| r.payload.document_id != document_id);
        Ok(())
    }
}
