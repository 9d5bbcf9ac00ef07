//! Shared test doubles and fixtures: a deterministic embedder, a
//! counting chat mock, and a hand-built multi-page PDF.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicUsize, Ordering};

use paperchat::embedding::EmbeddingProvider;
use paperchat::llm::ChatModel;

pub const DIMS: usize = 32;

/// Deterministic bag-of-words embedder: each word hashes into one of
/// `DIMS` buckets, so texts sharing words land near each other under
/// cosine similarity. Good enough to make retrieval meaningful in tests.
pub struct HashEmbedder;

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-test"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; DIMS];
                for word in t.to_lowercase().split_whitespace() {
                    let bucket = word.bytes().map(|b| b as usize).sum::<usize>() % DIMS;
                    v[bucket] += 1.0;
                }
                v
            })
            .collect())
    }
}

/// Chat mock that echoes a digest of its inputs and counts invocations.
pub struct EchoChat {
    calls: AtomicUsize,
}

impl EchoChat {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for EchoChat {
    fn model_name(&self) -> &str {
        "echo-test"
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!(
            "answer to '{}' from {} context chars",
            user,
            system.len()
        ))
    }
}

/// Minimal valid multi-page PDF, one text line per page. Builds the body
/// first, then the xref table with correct byte offsets so pdf-extract
/// can parse it.
pub fn minimal_pdf(pages: &[&str]) -> Vec<u8> {
    let n = pages.len();
    let mut out = Vec::new();
    let mut offsets = Vec::new();

    out.extend_from_slice(b"%PDF-1.4\n");

    // 1: catalog, 2: pages, 3..: page+content pairs, last: shared font.
    let kids: Vec<String> = (0..n).map(|i| format!("{} 0 R", 3 + 2 * i)).collect();
    let font_no = 3 + 2 * n;

    offsets.push(out.len());
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");

    offsets.push(out.len());
    out.extend_from_slice(
        format!(
            "2 0 obj << /Type /Pages /Kids [{}] /Count {} >> endobj\n",
            kids.join(" "),
            n
        )
        .as_bytes(),
    );

    for (i, text) in pages.iter().enumerate() {
        let page_no = 3 + 2 * i;
        let content_no = page_no + 1;

        offsets.push(out.len());
        out.extend_from_slice(
            format!(
                "{} 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
                 /Contents {} 0 R /Resources << /Font << /F1 {} 0 R >> >> >> endobj\n",
                page_no, content_no, font_no
            )
            .as_bytes(),
        );

        let stream = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET\n", text);
        offsets.push(out.len());
        out.extend_from_slice(
            format!("{} 0 obj << /Length {} >> stream\n", content_no, stream.len()).as_bytes(),
        );
        out.extend_from_slice(stream.as_bytes());
        out.extend_from_slice(b"endstream endobj\n");
    }

    offsets.push(out.len());
    out.extend_from_slice(
        format!(
            "{} 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
            font_no
        )
        .as_bytes(),
    );

    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", offsets.len() + 1).as_bytes());
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in &offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer << /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            offsets.len() + 1,
            xref_start
        )
        .as_bytes(),
    );
    out
}

pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    paperchat::migrate::run_migrations(&pool).await.unwrap();
    pool
}
