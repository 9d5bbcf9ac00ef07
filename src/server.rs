//! HTTP API.
//!
//! All routes except `/health` require a bearer token (see [`crate::auth`])
//! and act only on the caller's own documents. Handlers validate inputs
//! before touching any external service, and every success body carries
//! `"success": true` so clients can branch without inspecting status codes.
//!
//! Upload is intentionally asynchronous: `POST /upload/pdf` stores the
//! file, records the document, and enqueues an ingestion job, returning
//! before any chunking or embedding happens. Questions asked before the
//! worker finishes simply retrieve nothing and get the no-context answer.

use axum::extract::{DefaultBodyLimit, FromRef, Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::answer;
use crate::auth::{AuthUser, AuthVerifier};
use crate::config::Config;
use crate::documents;
use crate::embedding::EmbeddingProvider;
use crate::error::ApiError;
use crate::history;
use crate::llm::ChatModel;
use crate::models::Document;
use crate::queue::{JobKind, JobQueue};
use crate::vector::VectorIndex;

/// Upload cap. PDFs beyond this are rejected at the framework layer.
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: SqlitePool,
    pub queue: JobQueue,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub index: Arc<dyn VectorIndex>,
    pub chat: Arc<dyn ChatModel>,
    pub auth: AuthVerifier,
}

impl FromRef<AppState> for AuthVerifier {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/upload/pdf", post(upload_pdf))
        .route("/pdfs", get(list_pdfs))
        .route("/pdfs/{pdf_id}", get(get_pdf))
        .route("/del-pdf/{pdf_id}", delete(delete_pdf))
        .route("/chat", get(chat))
        .route("/chat/history", get(chat_history))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let pool = crate::db::connect(&config).await?;
    crate::migrate::run_migrations(&pool).await?;

    let embedder: Arc<dyn EmbeddingProvider> =
        crate::embedding::create_provider(&config.embedding)?.into();
    let index: Arc<dyn VectorIndex> = crate::vector::create_index(&config.vector)?.into();
    if config.embedding.is_enabled() {
        index.ensure_ready(embedder.dims()).await?;
    }
    let chat: Arc<dyn ChatModel> = crate::llm::create_chat(&config.llm)?.into();
    let auth = AuthVerifier::from_env()?;

    let queue = JobQueue::new(
        pool.clone(),
        config.queue.lease_secs,
        config.queue.max_attempts,
    );

    std::fs::create_dir_all(&config.storage.upload_dir)?;

    let bind = config.server.bind.clone();
    let state = AppState {
        config: Arc::new(config),
        pool,
        queue,
        embedder,
        index,
        chat,
        auth,
    };

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(%bind, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn upload_pdf(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed upload: {}", e)))?
    {
        if field.name() != Some("pdf") {
            continue;
        }
        let original_name = field
            .file_name()
            .unwrap_or("document.pdf")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Malformed upload: {}", e)))?;
        upload = Some((original_name, bytes.to_vec()));
        break;
    }

    let (original_name, bytes) =
        upload.ok_or_else(|| ApiError::BadRequest("No PDF file uploaded".to_string()))?;

    if bytes.is_empty() {
        return Err(ApiError::BadRequest("No PDF file uploaded".to_string()));
    }
    if !original_name.to_lowercase().ends_with(".pdf") && !bytes.starts_with(b"%PDF") {
        return Err(ApiError::BadRequest("Only PDF files are allowed".to_string()));
    }

    let stored_name = stored_name(&original_name);
    let file_path = state.config.storage.upload_dir.join(&stored_name);
    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| ApiError::upstream("storage", e))?;

    let doc = Document {
        id: Uuid::new_v4().to_string(),
        user_id,
        original_name,
        stored_name: stored_name.clone(),
        url: format!(
            "{}/{}",
            state.config.storage.public_base.trim_end_matches('/'),
            stored_name
        ),
        file_path: file_path.to_string_lossy().into_owned(),
        created_at: chrono::Utc::now().timestamp(),
    };

    documents::create(&state.pool, &doc)
        .await
        .map_err(|e| ApiError::upstream("database", e))?;
    state
        .queue
        .enqueue(JobKind::Ingest, &doc.id, Some(&doc.file_path))
        .await
        .map_err(|e| ApiError::upstream("queue", e))?;

    tracing::info!(document_id = %doc.id, name = %doc.original_name, "upload accepted");

    Ok((
        StatusCode::OK,
        Json(json!({
            "success": true,
            "pdfId": doc.id,
            "originalName": doc.original_name,
            "url": doc.url,
        })),
    ))
}

async fn list_pdfs(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let docs = documents::list(&state.pool, &user_id)
        .await
        .map_err(|e| ApiError::upstream("database", e))?;
    Ok(Json(json!({ "success": true, "pdfs": docs })))
}

async fn get_pdf(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(pdf_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let doc = documents::get(&state.pool, &pdf_id, &user_id)
        .await
        .map_err(|e| ApiError::upstream("database", e))?
        .ok_or_else(|| ApiError::NotFound("PDF not found".to_string()))?;
    Ok(Json(json!({ "success": true, "pdf": doc })))
}

async fn delete_pdf(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(pdf_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let doc = documents::mark_deleted(&state.pool, &pdf_id, &user_id)
        .await
        .map_err(|e| ApiError::upstream("database", e))?
        .ok_or_else(|| ApiError::NotFound("PDF not found".to_string()))?;

    state
        .queue
        .enqueue(JobKind::Purge, &doc.id, None)
        .await
        .map_err(|e| ApiError::upstream("queue", e))?;

    tracing::info!(document_id = %doc.id, "deletion accepted");
    Ok(Json(json!({ "success": true, "message": "PDF deleted" })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatParams {
    #[serde(default)]
    pdf_id: String,
    #[serde(default)]
    message: String,
}

async fn chat(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(params): Query<ChatParams>,
) -> Result<impl IntoResponse, ApiError> {
    if params.pdf_id.trim().is_empty() {
        return Err(ApiError::BadRequest("pdfId is required".to_string()));
    }
    if params.message.trim().is_empty() {
        return Err(ApiError::BadRequest("message is required".to_string()));
    }

    documents::get(&state.pool, &params.pdf_id, &user_id)
        .await
        .map_err(|e| ApiError::upstream("database", e))?
        .ok_or_else(|| ApiError::NotFound("PDF not found".to_string()))?;

    let result = answer::answer(
        &state.pool,
        &state.config.retrieval,
        state.embedder.as_ref(),
        state.index.as_ref(),
        state.chat.as_ref(),
        &params.pdf_id,
        &user_id,
        params.message.trim(),
    )
    .await?;

    Ok(Json(json!({
        "success": true,
        "message": result.text,
        "docs": result.sources,
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryParams {
    #[serde(default)]
    pdf_id: String,
}

async fn chat_history(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, ApiError> {
    if params.pdf_id.trim().is_empty() {
        return Err(ApiError::BadRequest("pdfId is required".to_string()));
    }

    let messages = history::get_thread(&state.pool, &params.pdf_id, &user_id)
        .await
        .map_err(|e| ApiError::upstream("database", e))?;

    Ok(Json(json!({ "success": true, "messages": messages })))
}

/// Collision-resistant stored filename: timestamp, random suffix, and a
/// sanitized original name.
fn stored_name(original: &str) -> String {
    let sanitized: String = original
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
    format!(
        "{}-{}-{}",
        chrono::Utc::now().timestamp_millis(),
        suffix,
        sanitized
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_names_are_sanitized() {
        let name = stored_name("my report (final)?.pdf");
        assert!(name.ends_with("my_report__final__.pdf"));
        assert!(!name.contains(' '));
        assert!(!name.contains('('));
    }

    #[test]
    fn stored_names_differ_between_calls() {
        assert_ne!(stored_name("a.pdf"), stored_name("a.pdf"));
    }
}
