//! Document metadata store.
//!
//! All reads exclude soft-deleted rows: deletion marks `deleted_at` first
//! so the document disappears from the API immediately, while a purge job
//! cleans up the vector index, conversation thread, stored file, and
//! finally the row itself.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::models::Document;

pub async fn create(pool: &SqlitePool, doc: &Document) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO documents (id, user_id, original_name, stored_name, url, file_path, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&doc.id)
    .bind(&doc.user_id)
    .bind(&doc.original_name)
    .bind(&doc.stored_name)
    .bind(&doc.url)
    .bind(&doc.file_path)
    .bind(doc.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// List a user's documents, newest first.
pub async fn list(pool: &SqlitePool, user_id: &str) -> Result<Vec<Document>> {
    let docs = sqlx::query_as::<_, Document>(
        r#"
        SELECT id, user_id, original_name, stored_name, url, file_path, created_at
        FROM documents
        WHERE user_id = ? AND deleted_at IS NULL
        ORDER BY created_at DESC, id DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(docs)
}

/// Fetch one document, owner-scoped. Returns `None` for other users' docs.
pub async fn get(pool: &SqlitePool, id: &str, user_id: &str) -> Result<Option<Document>> {
    let doc = sqlx::query_as::<_, Document>(
        r#"
        SELECT id, user_id, original_name, stored_name, url, file_path, created_at
        FROM documents
        WHERE id = ? AND user_id = ? AND deleted_at IS NULL
        "#,
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(doc)
}

/// Soft-delete a document. Returns the row (with its file path) when the
/// caller owned it, so the purge job can be enqueued.
pub async fn mark_deleted(pool: &SqlitePool, id: &str, user_id: &str) -> Result<Option<Document>> {
    let doc = get(pool, id, user_id).await?;
    if doc.is_none() {
        return Ok(None);
    }

    let now = chrono::Utc::now().timestamp();
    sqlx::query("UPDATE documents SET deleted_at = ? WHERE id = ? AND user_id = ?")
        .bind(now)
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(doc)
}

/// Remove the document row for good. Last step of the purge job.
pub async fn purge_row(pool: &SqlitePool, id: &str) -> Result<()> {
    sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Look up the stored file path of a document, deleted or not.
pub async fn file_path(pool: &SqlitePool, id: &str) -> Result<Option<String>> {
    let path: Option<String> = sqlx::query_scalar("SELECT file_path FROM documents WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(path)
}
