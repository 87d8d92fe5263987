//! SQLite-backed job store using sqlx.

use {
    async_trait::async_trait,
    sqlx::{Row, SqlitePool, sqlite::SqliteRow},
};

use crate::{
    Error, Result,
    error::Context,
    store::JobStore,
    types::{DispatchJob, JobCreate, JobStatus, QueueStatus},
};

/// SQLite-backed persistence for dispatch jobs.
///
/// Claiming runs select-and-mark inside one transaction, so concurrent
/// worker processes sharing the database never double-claim a job.
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    /// Create a store using an existing pool (migrations must already be run).
    ///
    /// Call [`crate::run_migrations`] before using this constructor.
    #[must_use]
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn job_from_row(row: &SqliteRow) -> Result<DispatchJob> {
    let payload_text: String = row.get("payload");
    let status_text: String = row.get("status");
    let status = JobStatus::parse(&status_text)
        .ok_or_else(|| Error::message(format!("unknown job status in store: {status_text}")))?;
    Ok(DispatchJob {
        id: row.get("id"),
        seq: row.get("seq"),
        tenant_id: row.get("tenant_id"),
        conversation_id: row.get("conversation_id"),
        payload: serde_json::from_str(&payload_text).context("decode stored job payload")?,
        priority: row.get::<i64, _>("priority") as i32,
        attempts: row.get::<i64, _>("attempts") as u32,
        status,
        last_error: row.get("last_error"),
        available_at_ms: row.get::<i64, _>("available_at_ms") as u64,
        created_at_ms: row.get::<i64, _>("created_at_ms") as u64,
        updated_at_ms: row.get::<i64, _>("updated_at_ms") as u64,
    })
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn enqueue(&self, create: JobCreate, now_ms: u64) -> Result<DispatchJob> {
        let id = tavolo_common::new_id();
        let payload = serde_json::to_string(&create.payload)?;
        let result = sqlx::query(
            "INSERT INTO dispatch_jobs
                 (id, tenant_id, conversation_id, payload, priority, attempts,
                  status, available_at_ms, created_at_ms, updated_at_ms)
             VALUES (?, ?, ?, ?, ?, 0, 'waiting', ?, ?, ?)",
        )
        .bind(&id)
        .bind(&create.tenant_id)
        .bind(&create.conversation_id)
        .bind(&payload)
        .bind(create.priority as i64)
        .bind(now_ms as i64)
        .bind(now_ms as i64)
        .bind(now_ms as i64)
        .execute(&self.pool)
        .await?;

        Ok(DispatchJob {
            id,
            seq: result.last_insert_rowid(),
            tenant_id: create.tenant_id,
            conversation_id: create.conversation_id,
            payload: create.payload,
            priority: create.priority,
            attempts: 0,
            status: JobStatus::Waiting,
            last_error: None,
            available_at_ms: now_ms,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        })
    }

    async fn claim_next(&self, now_ms: u64) -> Result<Option<DispatchJob>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT * FROM dispatch_jobs j
             WHERE j.status IN ('waiting', 'delayed') AND j.available_at_ms <= ?
               AND NOT EXISTS (
                   SELECT 1 FROM dispatch_jobs o
                   WHERE o.tenant_id = j.tenant_id
                     AND o.conversation_id = j.conversation_id
                     AND o.seq < j.seq
                     AND o.status IN ('waiting', 'active', 'delayed')
               )
             ORDER BY j.priority DESC, j.seq ASC
             LIMIT 1",
        )
        .bind(now_ms as i64)
        .fetch_optional(&mut *tx)
        .await?;

        let job = match row {
            None => None,
            Some(row) => {
                let mut job = job_from_row(&row)?;
                sqlx::query(
                    "UPDATE dispatch_jobs SET status = 'active', updated_at_ms = ? WHERE seq = ?",
                )
                .bind(now_ms as i64)
                .bind(job.seq)
                .execute(&mut *tx)
                .await?;
                job.status = JobStatus::Active;
                job.updated_at_ms = now_ms;
                Some(job)
            },
        };

        tx.commit().await?;
        Ok(job)
    }

    async fn delay(&self, job_id: &str, available_at_ms: u64, now_ms: u64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE dispatch_jobs
             SET status = 'delayed', available_at_ms = ?, updated_at_ms = ?
             WHERE id = ?",
        )
        .bind(available_at_ms as i64)
        .bind(now_ms as i64)
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::job_not_found(job_id));
        }
        Ok(())
    }

    async fn retry(
        &self,
        job_id: &str,
        attempts: u32,
        available_at_ms: u64,
        error: &str,
        now_ms: u64,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE dispatch_jobs
             SET status = 'delayed', attempts = ?, last_error = ?,
                 available_at_ms = ?, updated_at_ms = ?
             WHERE id = ?",
        )
        .bind(attempts as i64)
        .bind(error)
        .bind(available_at_ms as i64)
        .bind(now_ms as i64)
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::job_not_found(job_id));
        }
        Ok(())
    }

    async fn complete(&self, job_id: &str, now_ms: u64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE dispatch_jobs SET status = 'completed', updated_at_ms = ? WHERE id = ?",
        )
        .bind(now_ms as i64)
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::job_not_found(job_id));
        }
        Ok(())
    }

    async fn fail(&self, job_id: &str, error: &str, now_ms: u64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE dispatch_jobs
             SET status = 'failed', last_error = ?, updated_at_ms = ?
             WHERE id = ?",
        )
        .bind(error)
        .bind(now_ms as i64)
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::job_not_found(job_id));
        }
        Ok(())
    }

    async fn requeue_stalled(&self, now_ms: u64, stall_timeout_ms: u64) -> Result<u64> {
        let cutoff = now_ms.saturating_sub(stall_timeout_ms);
        let result = sqlx::query(
            "UPDATE dispatch_jobs
             SET status = 'waiting', available_at_ms = ?, updated_at_ms = ?
             WHERE status = 'active' AND updated_at_ms <= ?",
        )
        .bind(now_ms as i64)
        .bind(now_ms as i64)
        .bind(cutoff as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn purge_terminal(&self, now_ms: u64, retention_ms: u64) -> Result<u64> {
        let cutoff = now_ms.saturating_sub(retention_ms);
        let result = sqlx::query(
            "DELETE FROM dispatch_jobs
             WHERE status IN ('completed', 'failed') AND updated_at_ms <= ?",
        )
        .bind(cutoff as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn get(&self, job_id: &str) -> Result<Option<DispatchJob>> {
        let row = sqlx::query("SELECT * FROM dispatch_jobs WHERE id = ?")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(job_from_row).transpose()
    }

    async fn counts(&self) -> Result<QueueStatus> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS n FROM dispatch_jobs GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts = QueueStatus::default();
        for row in rows {
            let status: String = row.get("status");
            let n = row.get::<i64, _>("n") as u64;
            match JobStatus::parse(&status) {
                Some(JobStatus::Waiting) => counts.waiting = n,
                Some(JobStatus::Active) => counts.active = n,
                Some(JobStatus::Delayed) => counts.delayed = n,
                Some(JobStatus::Completed) => counts.completed = n,
                Some(JobStatus::Failed) => counts.failed = n,
                None => {},
            }
        }
        Ok(counts)
    }
}
