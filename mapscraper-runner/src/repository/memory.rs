//! In-memory job store
//!
//! Jobs live only in process memory and are lost on exit or crash.
//! Delivery is FIFO in the order pushes complete.

use async_trait::async_trait;
use mapscraper_core::domain::job::{Job, JobStatus};
use mapscraper_core::queue::{JobQueue, Provider, QueueError};
use std::collections::{HashSet, VecDeque};
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Default)]
struct Inner {
    queue: VecDeque<Job>,
    /// Ids queued or in flight
    live: HashSet<String>,
    /// In-flight jobs, kept so an interrupted job can be requeued
    in_flight: Vec<Job>,
}

/// Non-durable queue shared by the ingestion API and in-process consumers
#[derive(Default)]
pub struct MemoryJobStore {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs waiting to be taken
    pub async fn len(&self) -> usize {
        self.inner.lock().await.queue.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl Provider for MemoryJobStore {
    async fn push(&self, job: &Job, cancel: &CancellationToken) -> Result<(), QueueError> {
        if cancel.is_cancelled() {
            return Err(QueueError::Cancelled);
        }

        {
            let mut inner = self.inner.lock().await;
            if !inner.live.insert(job.id().to_string()) {
                return Err(QueueError::Conflict(job.id().to_string()));
            }
            inner.queue.push_back(job.clone());
        }

        self.notify.notify_one();
        debug!(job_id = %job.id(), "job queued in memory");
        Ok(())
    }
}

#[async_trait]
impl JobQueue for MemoryJobStore {
    async fn next_job(&self, cancel: &CancellationToken) -> Result<Option<Job>, QueueError> {
        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }

            {
                let mut inner = self.inner.lock().await;
                if let Some(job) = inner.queue.pop_front() {
                    inner.in_flight.push(job.clone());
                    // Wake another consumer if work remains.
                    if !inner.queue.is_empty() {
                        self.notify.notify_one();
                    }
                    return Ok(Some(job));
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                _ = self.notify.notified() => {}
            }
        }
    }

    async fn complete(&self, job_id: &str, status: JobStatus) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().await;

        let Some(pos) = inner.in_flight.iter().position(|job| job.id() == job_id) else {
            return Err(QueueError::Storage(format!("job {} is not in flight", job_id)));
        };
        let job = inner.in_flight.swap_remove(pos);

        if status == JobStatus::New {
            inner.queue.push_front(job);
            drop(inner);
            self.notify.notify_one();
            debug!(job_id, "job requeued");
            return Ok(());
        }

        inner.live.remove(job_id);
        debug!(job_id, status = %status, "job completed");
        Ok(())
    }
}
