//! Queue contracts
//!
//! `Provider` is the producer side used by the ingestion API and by the
//! database producer; `JobQueue` is the consumer side used by the runners
//! that drain the queue. A backing store usually implements both.
//!
//! Delivery guarantees depend on the backing store and are documented on
//! each implementation. Ordering across concurrent pushes is only what the
//! store itself enforces.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::job::{Job, JobStatus};

/// Errors raised by a queue backing store
///
/// A failed `push` never leaves a partial job behind.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Backing store could not be reached
    #[error("queue backend unavailable: {0}")]
    Unavailable(String),

    /// A uniqueness constraint was violated (e.g. duplicate job id)
    #[error("job {0} already exists")]
    Conflict(String),

    /// Any other storage failure
    #[error("queue storage error: {0}")]
    Storage(String),

    /// Stored payload could not be encoded or decoded
    #[error("job payload error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The caller's cancellation token fired before the job was stored
    #[error("push cancelled")]
    Cancelled,
}

/// Producer contract: enqueue a job for later processing.
///
/// Implementations must be safe to call from any number of tasks at once
/// without external locking.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Adds a job to the queue
    ///
    /// Returns [`QueueError::Cancelled`] promptly once `cancel` fires while
    /// the provider is still waiting for its backing store; the job is then
    /// not stored.
    ///
    /// # Arguments
    /// * `job` - The job to enqueue; the provider copies what it needs
    /// * `cancel` - Root token of the calling request or runner
    async fn push(&self, job: &Job, cancel: &CancellationToken) -> Result<(), QueueError>;
}

/// Consumer contract: take jobs off the queue and report their outcome.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Waits for the next job.
    ///
    /// Returns `Ok(None)` as soon as `cancel` fires.
    async fn next_job(&self, cancel: &CancellationToken) -> Result<Option<Job>, QueueError>;

    /// Records the final status of a job obtained from `next_job`
    async fn complete(&self, job_id: &str, status: JobStatus) -> Result<(), QueueError>;
}
