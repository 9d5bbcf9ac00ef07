//! Durable job queue over SQLite.
//!
//! Decouples upload acceptance from ingestion: the API inserts a pending
//! row and returns immediately, a separate worker process claims and runs
//! jobs. Delivery is at-least-once — a claimed job whose lease expires
//! (worker crash, stall) becomes claimable again, so consumers must be
//! idempotent. Failed jobs are re-queued with exponential backoff until
//! `max_attempts`, then parked as `failed` with the error recorded.

use anyhow::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// Chunk, embed, and index an uploaded PDF.
    Ingest,
    /// Remove a deleted document's vectors, thread, file, and row.
    Purge,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Ingest => "ingest",
            JobKind::Purge => "purge",
        }
    }

    pub fn parse(s: &str) -> Option<JobKind> {
        match s {
            "ingest" => Some(JobKind::Ingest),
            "purge" => Some(JobKind::Purge),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Job {
    pub id: String,
    pub kind: String,
    pub document_id: String,
    pub file_path: Option<String>,
    pub status: String,
    pub attempts: i64,
    pub run_after: i64,
    pub lease_expires_at: Option<i64>,
    pub last_error: Option<String>,
}

#[derive(Clone)]
pub struct JobQueue {
    pool: SqlitePool,
    lease_secs: i64,
    max_attempts: i64,
}

impl JobQueue {
    pub fn new(pool: SqlitePool, lease_secs: i64, max_attempts: i64) -> Self {
        Self {
            pool,
            lease_secs,
            max_attempts,
        }
    }

    /// Insert a pending job and return its id. Fire-and-forget from the
    /// caller's perspective — nothing waits on the worker.
    pub async fn enqueue(
        &self,
        kind: JobKind,
        document_id: &str,
        file_path: Option<&str>,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO jobs (id, kind, document_id, file_path, status, attempts, run_after, created_at, updated_at)
            VALUES (?, ?, ?, ?, 'pending', 0, 0, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(kind.as_str())
        .bind(document_id)
        .bind(file_path)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    /// Atomically claim the oldest runnable job, bumping its attempt count
    /// and leasing it for `lease_secs`. Eligible jobs are pending rows
    /// whose backoff has elapsed, plus running rows whose lease expired.
    ///
    /// A job whose lease expired on its final attempt (worker died mid-run
    /// with no attempts left) is parked as `failed` here, since `fail` was
    /// never reached for it.
    pub async fn claim(&self) -> Result<Option<Job>> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'failed', last_error = 'lease expired',
                lease_expires_at = NULL, updated_at = ?
            WHERE status = 'running' AND lease_expires_at < ? AND attempts >= ?
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(self.max_attempts)
        .execute(&self.pool)
        .await?;

        let job = sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs
            SET status = 'running',
                attempts = attempts + 1,
                lease_expires_at = ?,
                updated_at = ?
            WHERE id = (
                SELECT id FROM jobs
                WHERE attempts < ?
                  AND (
                        (status = 'pending' AND run_after <= ?)
                     OR (status = 'running' AND lease_expires_at < ?)
                  )
                ORDER BY created_at
                LIMIT 1
            )
            RETURNING id, kind, document_id, file_path, status, attempts,
                      run_after, lease_expires_at, last_error
            "#,
        )
        .bind(now + self.lease_secs)
        .bind(now)
        .bind(self.max_attempts)
        .bind(now)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    pub async fn complete(&self, job_id: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            "UPDATE jobs SET status = 'done', lease_expires_at = NULL, updated_at = ? WHERE id = ?",
        )
        .bind(now)
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a failure. Re-queues with exponential backoff while attempts
    /// remain, otherwise parks the job as `failed`.
    pub async fn fail(&self, job: &Job, err: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        if job.attempts >= self.max_attempts {
            sqlx::query(
                "UPDATE jobs SET status = 'failed', last_error = ?, lease_expires_at = NULL, updated_at = ? WHERE id = ?",
            )
            .bind(err)
            .bind(now)
            .bind(&job.id)
            .execute(&self.pool)
            .await?;
        } else {
            // Backoff: 2s, 4s, 8s, ...
            let delay = 1i64 << job.attempts.clamp(1, 10);
            sqlx::query(
                r#"
                UPDATE jobs
                SET status = 'pending', last_error = ?, run_after = ?,
                    lease_expires_at = NULL, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(err)
            .bind(now + delay)
            .bind(now)
            .bind(&job.id)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    #[tokio::test]
    async fn enqueue_then_claim() {
        let queue = JobQueue::new(test_pool().await, 60, 3);
        queue
            .enqueue(JobKind::Ingest, "doc1", Some("/tmp/doc1.pdf"))
            .await
            .unwrap();

        let job = queue.claim().await.unwrap().expect("job should be claimable");
        assert_eq!(job.kind, "ingest");
        assert_eq!(job.document_id, "doc1");
        assert_eq!(job.file_path.as_deref(), Some("/tmp/doc1.pdf"));
        assert_eq!(job.attempts, 1);
    }

    #[tokio::test]
    async fn claimed_job_is_invisible_until_lease_expires() {
        let queue = JobQueue::new(test_pool().await, 60, 3);
        queue.enqueue(JobKind::Ingest, "doc1", None).await.unwrap();

        assert!(queue.claim().await.unwrap().is_some());
        // Lease still active — nothing to claim.
        assert!(queue.claim().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_lease_redelivers() {
        // Zero-length lease: a claimed job is immediately eligible again.
        let queue = JobQueue::new(test_pool().await, -1, 5);
        queue.enqueue(JobKind::Ingest, "doc1", None).await.unwrap();

        let first = queue.claim().await.unwrap().unwrap();
        let second = queue.claim().await.unwrap().expect("redelivery expected");
        assert_eq!(first.id, second.id);
        assert_eq!(second.attempts, 2);
    }

    #[tokio::test]
    async fn completed_job_is_not_redelivered() {
        let queue = JobQueue::new(test_pool().await, -1, 5);
        queue.enqueue(JobKind::Ingest, "doc1", None).await.unwrap();

        let job = queue.claim().await.unwrap().unwrap();
        queue.complete(&job.id).await.unwrap();
        assert!(queue.claim().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failure_backs_off_then_dead_letters() {
        let queue = JobQueue::new(test_pool().await, 60, 2);
        queue.enqueue(JobKind::Ingest, "doc1", None).await.unwrap();

        let job = queue.claim().await.unwrap().unwrap();
        assert_eq!(job.attempts, 1);
        queue.fail(&job, "boom").await.unwrap();

        // Backoff pushes run_after into the future — not yet claimable.
        assert!(queue.claim().await.unwrap().is_none());

        // Wind the clock: make the job due again.
        let now = chrono::Utc::now().timestamp();
        sqlx::query("UPDATE jobs SET run_after = ? WHERE id = ?")
            .bind(now - 1)
            .bind(&job.id)
            .execute(&queue.pool)
            .await
            .unwrap();

        let job = queue.claim().await.unwrap().expect("retry expected");
        assert_eq!(job.attempts, 2);
        assert_eq!(job.last_error.as_deref(), Some("boom"));

        // Attempts exhausted — parked as failed, never redelivered.
        queue.fail(&job, "boom again").await.unwrap();
        assert!(queue.claim().await.unwrap().is_none());

        let status: String = sqlx::query_scalar("SELECT status FROM jobs WHERE id = ?")
            .bind(&job.id)
            .fetch_one(&queue.pool)
            .await
            .unwrap();
        assert_eq!(status, "failed");
    }

    #[tokio::test]
    async fn lease_expiry_on_final_attempt_dead_letters() {
        // Worker crashes mid-run on the last allowed attempt: the job can
        // never be claimed again, so it must end up failed, not stuck
        // running forever.
        let queue = JobQueue::new(test_pool().await, -1, 1);
        queue.enqueue(JobKind::Ingest, "doc1", None).await.unwrap();

        let job = queue.claim().await.unwrap().unwrap();
        assert_eq!(job.attempts, 1);

        // Lease already expired, attempts exhausted — nothing claimable.
        assert!(queue.claim().await.unwrap().is_none());

        let (status, last_error): (String, Option<String>) =
            sqlx::query_as("SELECT status, last_error FROM jobs WHERE id = ?")
                .bind(&job.id)
                .fetch_one(&queue.pool)
                .await
                .unwrap();
        assert_eq!(status, "failed");
        assert_eq!(last_error.as_deref(), Some("lease expired"));
    }

    #[tokio::test]
    async fn jobs_for_different_documents_are_independent() {
        let queue = JobQueue::new(test_pool().await, 60, 3);
        queue.enqueue(JobKind::Ingest, "doc1", None).await.unwrap();
        queue.enqueue(JobKind::Purge, "doc2", None).await.unwrap();

        let a = queue.claim().await.unwrap().unwrap();
        let b = queue.claim().await.unwrap().unwrap();
        assert_ne!(a.document_id, b.document_id);
    }
}
