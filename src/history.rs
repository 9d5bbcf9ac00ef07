//! Conversation store: per-(document, user) append-only message threads.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::models::{ChatMessage, Role, ScoredRecord};

/// Append a question/answer pair in one transaction. No deduplication —
/// resending the same exchange appends it again.
pub async fn append_exchange(
    pool: &SqlitePool,
    document_id: &str,
    user_id: &str,
    question: &str,
    answer: &str,
    sources: &[ScoredRecord],
) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    let cited_json = serde_json::to_string(sources)?;

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO messages (document_id, user_id, role, content, cited_json, created_at)
        VALUES (?, ?, 'user', ?, NULL, ?)
        "#,
    )
    .bind(document_id)
    .bind(user_id)
    .bind(question)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO messages (document_id, user_id, role, content, cited_json, created_at)
        VALUES (?, ?, 'assistant', ?, ?, ?)
        "#,
    )
    .bind(document_id)
    .bind(user_id)
    .bind(answer)
    .bind(&cited_json)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Full ordered history for one thread; empty when no thread exists yet.
pub async fn get_thread(
    pool: &SqlitePool,
    document_id: &str,
    user_id: &str,
) -> Result<Vec<ChatMessage>> {
    let rows = sqlx::query(
        r#"
        SELECT role, content, cited_json
        FROM messages
        WHERE document_id = ? AND user_id = ?
        ORDER BY id
        "#,
    )
    .bind(document_id)
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let mut messages = Vec::with_capacity(rows.len());
    for row in rows {
        let role: String = row.get("role");
        let content: String = row.get("content");
        let cited_json: Option<String> = row.get("cited_json");

        let role = match role.as_str() {
            "assistant" => Role::Assistant,
            _ => Role::User,
        };
        let sources = cited_json
            .as_deref()
            .and_then(|j| serde_json::from_str::<Vec<ScoredRecord>>(j).ok())
            .filter(|s| !s.is_empty());

        messages.push(ChatMessage {
            role,
            content,
            sources,
        });
    }

    Ok(messages)
}

/// Drop every thread attached to a document. Used by the purge job.
pub async fn delete_threads(pool: &SqlitePool, document_id: &str) -> Result<()> {
    sqlx::query("DELETE FROM messages WHERE document_id = ?")
        .bind(document_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordPayload;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::migrate::run_migrations(&pool).await.unwrap();
        pool
    }

    fn record(document_id: &str) -> ScoredRecord {
        ScoredRecord {
            score: 0.9,
            payload: RecordPayload {
                document_id: document_id.to_string(),
                page: 1,
                line_start: 1,
                line_end: 3,
                text: "cited text".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn empty_thread_returns_empty_vec() {
        let pool = test_pool().await;
        let messages = get_thread(&pool, "doc1", "user1").await.unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn append_preserves_order_and_roles() {
        let pool = test_pool().await;
        append_exchange(&pool, "doc1", "user1", "q1", "a1", &[record("doc1")])
            .await
            .unwrap();
        append_exchange(&pool, "doc1", "user1", "q2", "a2", &[])
            .await
            .unwrap();

        let messages = get_thread(&pool, "doc1", "user1").await.unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "q1");
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, "a1");
        assert!(messages[1].sources.is_some());
        assert_eq!(messages[3].content, "a2");
        assert!(messages[3].sources.is_none());
    }

    #[tokio::test]
    async fn fetch_is_idempotent() {
        let pool = test_pool().await;
        append_exchange(&pool, "doc1", "user1", "q", "a", &[])
            .await
            .unwrap();

        let first = get_thread(&pool, "doc1", "user1").await.unwrap();
        let second = get_thread(&pool, "doc1", "user1").await.unwrap();
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.content, b.content);
            assert_eq!(a.role, b.role);
        }
    }

    #[tokio::test]
    async fn threads_are_scoped_to_document_and_user() {
        let pool = test_pool().await;
        append_exchange(&pool, "doc1", "user1", "q", "a", &[])
            .await
            .unwrap();

        assert!(get_thread(&pool, "doc1", "user2").await.unwrap().is_empty());
        assert!(get_thread(&pool, "doc2", "user1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_threads_removes_all_users_threads() {
        let pool = test_pool().await;
        append_exchange(&pool, "doc1", "user1", "q", "a", &[])
            .await
            .unwrap();
        append_exchange(&pool, "doc1", "user2", "q", "a", &[])
            .await
            .unwrap();

        delete_threads(&pool, "doc1").await.unwrap();
        assert!(get_thread(&pool, "doc1", "user1").await.unwrap().is_empty());
        assert!(get_thread(&pool, "doc1", "user2").await.unwrap().is_empty());
    }
}
