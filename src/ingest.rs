//! Ingestion and purge workers.
//!
//! Both jobs run out-of-band, claimed from the durable queue by
//! `paperchat work`. Because delivery is at-least-once, both are written
//! to be idempotent:
//!
//! - **Ingest** re-derives the same deterministic chunk ids on every run
//!   and clears the document's old records before upserting, so a
//!   redelivered job converges on the same index state.
//! - **Purge** treats already-gone vectors, threads, files, and rows as
//!   success.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::chunk::chunk_pages;
use crate::config::Config;
use crate::documents;
use crate::embedding::EmbeddingProvider;
use crate::extract::load_pdf_pages;
use crate::history;
use crate::models::{RecordPayload, VectorRecord};
use crate::queue::{JobKind, JobQueue};
use crate::vector::VectorIndex;

#[derive(Debug, Default)]
pub struct IngestStats {
    pub pages: usize,
    pub chunks: usize,
    pub vectors: usize,
}

/// Run the full ingestion pipeline for one uploaded PDF: extract pages,
/// chunk, embed, and replace the document's records in the vector index.
pub async fn ingest_document(
    config: &Config,
    embedder: &dyn EmbeddingProvider,
    index: &dyn VectorIndex,
    document_id: &str,
    file_path: &Path,
) -> Result<IngestStats> {
    let pages = load_pdf_pages(file_path)
        .with_context(|| format!("extracting {}", file_path.display()))?;
    tracing::info!(document_id, pages = pages.len(), "extracted pdf");

    let chunks = chunk_pages(document_id, &pages, &config.chunking);
    tracing::info!(document_id, chunks = chunks.len(), "chunked pages");

    let mut records = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(config.embedding.batch_size) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed(&texts).await?;

        for (chunk, vector) in batch.iter().zip(vectors) {
            records.push(VectorRecord {
                id: chunk.id.clone(),
                vector,
                payload: RecordPayload {
                    document_id: chunk.document_id.clone(),
                    page: chunk.page,
                    line_start: chunk.line_start,
                    line_end: chunk.line_end,
                    text: chunk.text.clone(),
                },
            });
        }
    }
    tracing::info!(document_id, vectors = records.len(), "embedded chunks");

    // Clear first so a re-run after a config change (different chunk
    // sizes, so different ids) cannot leave stale records behind.
    index.delete_document(document_id).await?;
    index.upsert(&records).await?;

    Ok(IngestStats {
        pages: pages.len(),
        chunks: chunks.len(),
        vectors: records.len(),
    })
}

/// Finish a deletion: remove the document's vectors, conversation
/// threads, stored file, and finally its row. Every step tolerates the
/// target already being gone.
pub async fn purge_document(
    pool: &SqlitePool,
    index: &dyn VectorIndex,
    document_id: &str,
) -> Result<()> {
    index.delete_document(document_id).await?;
    history::delete_threads(pool, document_id).await?;

    if let Some(path) = documents::file_path(pool, document_id).await? {
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e).with_context(|| format!("removing {}", path)),
        }
    }

    documents::purge_row(pool, document_id).await?;
    tracing::info!(document_id, "purged document");
    Ok(())
}

/// Worker loop: claim jobs until shutdown, dispatching by kind.
pub async fn run_worker(config: Config) -> Result<()> {
    let pool = crate::db::connect(&config).await?;
    crate::migrate::run_migrations(&pool).await?;

    let embedder: Arc<dyn EmbeddingProvider> = crate::embedding::create_provider(&config.embedding)?.into();
    let index: Arc<dyn VectorIndex> = crate::vector::create_index(&config.vector)?.into();
    if config.embedding.is_enabled() {
        index.ensure_ready(embedder.dims()).await?;
    }

    let queue = JobQueue::new(
        pool.clone(),
        config.queue.lease_secs,
        config.queue.max_attempts,
    );
    let poll = Duration::from_secs(config.queue.poll_interval_secs);

    tracing::info!("worker started");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("worker shutting down");
                return Ok(());
            }
            claimed = queue.claim() => {
                match claimed {
                    Ok(Some(job)) => {
                        let result = run_job(&config, &pool, embedder.as_ref(), index.as_ref(), &job).await;
                        match result {
                            Ok(()) => queue.complete(&job.id).await?,
                            Err(e) => {
                                tracing::warn!(
                                    job_id = %job.id,
                                    kind = %job.kind,
                                    document_id = %job.document_id,
                                    attempts = job.attempts,
                                    error = %format!("{:#}", e),
                                    "job failed"
                                );
                                queue.fail(&job, &format!("{:#}", e)).await?;
                            }
                        }
                    }
                    Ok(None) => tokio::time::sleep(poll).await,
                    Err(e) => {
                        tracing::error!(error = %e, "queue claim failed");
                        tokio::time::sleep(poll).await;
                    }
                }
            }
        }
    }
}

async fn run_job(
    config: &Config,
    pool: &SqlitePool,
    embedder: &dyn EmbeddingProvider,
    index: &dyn VectorIndex,
    job: &crate::queue::Job,
) -> Result<()> {
    match JobKind::parse(&job.kind) {
        Some(JobKind::Ingest) => {
            let path = job
                .file_path
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("ingest job without file path"))?;
            let stats =
                ingest_document(config, embedder, index, &job.document_id, Path::new(path)).await?;
            tracing::info!(
                document_id = %job.document_id,
                pages = stats.pages,
                chunks = stats.chunks,
                vectors = stats.vectors,
                "ingested document"
            );
            Ok(())
        }
        Some(JobKind::Purge) => purge_document(pool, index, &job.document_id).await,
        None => anyhow::bail!("unknown job kind: {}", job.kind),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChunkingConfig;
    use crate::vector::MemoryIndex;
    use async_trait::async_trait;
    use sqlx::sqlite::SqlitePoolOptions;

    struct FixedEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        fn model_name(&self) -> &str {
            "fixed"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| vec![t.len() as f32, 1.0, 0.0])
                .collect())
        }
    }

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::migrate::run_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn purge_clears_vectors_threads_and_row() {
        let pool = test_pool().await;
        let index = MemoryIndex::new();

        let doc = crate::models::Document {
            id: "doc1".to_string(),
            user_id: "user1".to_string(),
            original_name: "a.pdf".to_string(),
            stored_name: "1-a.pdf".to_string(),
            url: "/uploads/1-a.pdf".to_string(),
            file_path: "/nonexistent/1-a.pdf".to_string(),
            created_at: 0,
        };
        documents::create(&pool, &doc).await.unwrap();
        history::append_exchange(&pool, "doc1", "user1", "q", "a", &[])
            .await
            .unwrap();
        index
            .upsert(&[VectorRecord {
                id: "v1".to_string(),
                vector: vec![1.0, 0.0],
                payload: RecordPayload {
                    document_id: "doc1".to_string(),
                    page: 1,
                    line_start: 1,
                    line_end: 1,
                    text: "t".to_string(),
                },
            }])
            .await
            .unwrap();

        purge_document(&pool, &index, "doc1").await.unwrap();

        assert!(index.search(&[1.0, 0.0], "doc1", 10).await.unwrap().is_empty());
        assert!(history::get_thread(&pool, "doc1", "user1")
            .await
            .unwrap()
            .is_empty());
        assert!(documents::file_path(&pool, "doc1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn purge_is_idempotent() {
        let pool = test_pool().await;
        let index = MemoryIndex::new();
        // Nothing exists at all — still succeeds.
        purge_document(&pool, &index, "ghost").await.unwrap();
        purge_document(&pool, &index, "ghost").await.unwrap();
    }

    #[tokio::test]
    async fn embedding_runs_in_batches_of_configured_size() {
        // One record per chunk regardless of where batch boundaries fall.
        let embedder = FixedEmbedder;
        let chunking = ChunkingConfig {
            chunk_chars: 50,
            overlap_chars: 10,
        };
        let pages = vec!["lorem ipsum dolor sit amet ".repeat(20)];
        let chunks = chunk_pages("doc1", &pages, &chunking);
        assert!(chunks.len() > 3);

        let mut vectors = 0;
        for batch in chunks.chunks(2) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            vectors += embedder.embed(&texts).await.unwrap().len();
        }
        assert_eq!(vectors, chunks.len());
    }
}
