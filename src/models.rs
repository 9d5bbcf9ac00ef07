//! Core data types that flow through the ingestion and answering pipeline.

use serde::{Deserialize, Serialize};

/// An uploaded PDF, owned by the user who uploaded it.
///
/// Immutable after creation except for deletion, which sets `deleted_at`
/// and hands the actual cleanup to a purge job.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub user_id: String,
    pub original_name: String,
    pub stored_name: String,
    pub url: String,
    /// Absolute path of the stored upload; internal, never sent to clients.
    #[serde(skip)]
    pub file_path: String,
    pub created_at: i64,
}

/// A chunk of one page's text, in flight between splitting and embedding.
///
/// The `id` is deterministic for a given (document, page, index) so that
/// re-ingesting a document overwrites its old records instead of piling
/// up duplicates.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    /// 1-based page number in the source PDF.
    pub page: u32,
    /// 1-based line range of the chunk within its page.
    pub line_start: u32,
    pub line_end: u32,
    /// Position of the chunk across the whole document.
    pub chunk_index: i64,
    pub text: String,
}

/// Metadata stored alongside each vector in the index.
///
/// `document_id` is the only mechanism scoping retrieval to one document;
/// every record must carry it and every search must filter on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPayload {
    pub document_id: String,
    pub page: u32,
    pub line_start: u32,
    pub line_end: u32,
    pub text: String,
}

/// A vector plus payload, as written to the vector index.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: RecordPayload,
}

/// A retrieved record with its similarity score, returned as a citation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub score: f32,
    #[serde(flatten)]
    pub payload: RecordPayload,
}

/// Message author within a conversation thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of a (document, user) conversation thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Records cited by an assistant message; absent on user messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<ScoredRecord>>,
}
