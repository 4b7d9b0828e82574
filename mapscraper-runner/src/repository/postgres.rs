//! Postgres job store
//!
//! Durable queue in the `gmaps_jobs` table. Jobs survive restarts and are
//! delivered at least once:
//! - a job interrupted by shutdown goes back to `new`
//! - a claim is a lease; a `working` job untouched for longer than the lease
//!   (its consumer crashed or was aborted) is claimed again
//!
//! A scrape that outlives the lease may therefore run twice. Consumers claim
//! with `FOR UPDATE SKIP LOCKED`, so concurrent consumers never share a live
//! claim and delivery order across concurrent pushes is not guaranteed.

use async_trait::async_trait;
use mapscraper_core::domain::job::{Job, JobStatus};
use mapscraper_core::queue::{JobQueue, Provider, QueueError};
use sqlx::PgPool;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default time a claimed job may stay `working` before it is reclaimed
pub const DEFAULT_CLAIM_LEASE: Duration = Duration::from_secs(30 * 60);

/// Queue backed by Postgres
#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: PgPool,
    poll_interval: Duration,
    lease: Duration,
}

impl PostgresJobStore {
    /// # Arguments
    /// * `pool` - Connection pool; the schema must already exist
    /// * `poll_interval` - Wait between claim attempts on an empty queue
    pub fn new(pool: PgPool, poll_interval: Duration) -> Self {
        Self {
            pool,
            poll_interval,
            lease: DEFAULT_CLAIM_LEASE,
        }
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Claims the oldest `new` job or the oldest expired claim, if any
    async fn claim(&self) -> Result<Option<(String, serde_json::Value, String)>, QueueError> {
        let row: Option<(String, serde_json::Value, String)> = sqlx::query_as(
            r#"
            WITH next AS (
                SELECT id, status FROM gmaps_jobs
                WHERE status = $2
                   OR (status = $1 AND updated_at < now() - make_interval(secs => $3))
                ORDER BY priority ASC, created_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            UPDATE gmaps_jobs
            SET status = $1, updated_at = now()
            FROM next
            WHERE gmaps_jobs.id = next.id
            RETURNING gmaps_jobs.id, gmaps_jobs.payload, next.status
            "#,
        )
        .bind(JobStatus::Working.as_str())
        .bind(JobStatus::New.as_str())
        .bind(self.lease.as_secs_f64())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row)
    }

    async fn set_status(&self, job_id: &str, status: JobStatus) -> Result<(), QueueError> {
        sqlx::query("UPDATE gmaps_jobs SET status = $1, updated_at = now() WHERE id = $2")
            .bind(status.as_str())
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }
}

#[async_trait]
impl Provider for PostgresJobStore {
    async fn push(&self, job: &Job, cancel: &CancellationToken) -> Result<(), QueueError> {
        let payload = serde_json::to_value(job)?;

        // Only the wait for a connection is abandoned on cancel; once the
        // INSERT is sent it runs to completion so the outcome is known.
        let mut conn = tokio::select! {
            _ = cancel.cancelled() => return Err(QueueError::Cancelled),
            conn = self.pool.acquire() => conn.map_err(map_sqlx_error)?,
        };

        sqlx::query(
            r#"
            INSERT INTO gmaps_jobs (id, priority, payload, status)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(job.id())
        .bind(0_i32)
        .bind(payload)
        .bind(JobStatus::New.as_str())
        .execute(&mut *conn)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                QueueError::Conflict(job.id().to_string())
            }
            other => map_sqlx_error(other),
        })?;

        debug!(job_id = %job.id(), "job persisted");
        Ok(())
    }
}

#[async_trait]
impl JobQueue for PostgresJobStore {
    async fn next_job(&self, cancel: &CancellationToken) -> Result<Option<Job>, QueueError> {
        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }

            // Not raced against `cancel`: a dropped claim could commit with
            // nobody holding the job.
            let claimed = self.claim().await?;

            match claimed {
                Some((id, _, _)) if cancel.is_cancelled() => {
                    self.set_status(&id, JobStatus::New).await?;
                    debug!(job_id = %id, "claim released on shutdown");
                    return Ok(None);
                }
                Some((id, payload, previous)) => {
                    if previous == JobStatus::Working.as_str() {
                        info!(job_id = %id, "reclaimed job with an expired lease");
                    }
                    match serde_json::from_value::<Job>(payload) {
                        Ok(job) => return Ok(Some(job)),
                        Err(e) => {
                            warn!(job_id = %id, error = %e, "discarding undecodable job payload");
                            self.set_status(&id, JobStatus::Failed).await?;
                        }
                    }
                }
                None => {
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(None),
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
            }
        }
    }

    async fn complete(&self, job_id: &str, status: JobStatus) -> Result<(), QueueError> {
        self.set_status(job_id, status).await
    }
}

pub(crate) fn map_sqlx_error(err: sqlx::Error) -> QueueError {
    match err {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => QueueError::Unavailable(err.to_string()),
        other => QueueError::Storage(other.to_string()),
    }
}
