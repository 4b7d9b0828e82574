//! Worker pool
//!
//! A fixed number of workers each loop on `JobQueue::next_job`, scrape the
//! job, store its entries and report the outcome back to the queue. The pool
//! runs until the cancellation token fires; a job interrupted by cancellation
//! is handed back to the queue as `new`.

use mapscraper_core::domain::job::{Job, JobStatus};
use mapscraper_core::queue::JobQueue;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::{ScrapeError, Scraper};
use crate::error::RunnerError;
use crate::repository::ResultWriter;

/// Back-off after a queue error before polling again
const QUEUE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Counters shared by the workers of one pool
#[derive(Debug, Default)]
pub struct PoolStats {
    pub succeeded: AtomicUsize,
    pub failed: AtomicUsize,
    pub requeued: AtomicUsize,
}

/// Pool of queue consumers
pub struct WorkerPool {
    queue: Arc<dyn JobQueue>,
    scraper: Arc<dyn Scraper>,
    results: Arc<dyn ResultWriter>,
    concurrency: usize,
    stats: Arc<PoolStats>,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        scraper: Arc<dyn Scraper>,
        results: Arc<dyn ResultWriter>,
        concurrency: usize,
    ) -> Self {
        Self {
            queue,
            scraper,
            results,
            concurrency: concurrency.max(1),
            stats: Arc::default(),
        }
    }

    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    /// Runs the workers until `cancel` fires.
    ///
    /// Fails only if a worker task panics; the other workers are stopped.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), RunnerError> {
        info!(concurrency = self.concurrency, "starting worker pool");

        let stop = cancel.child_token();
        let mut workers = JoinSet::new();

        for worker_id in 0..self.concurrency {
            let worker = Worker {
                id: worker_id,
                queue: Arc::clone(&self.queue),
                scraper: Arc::clone(&self.scraper),
                results: Arc::clone(&self.results),
                stats: Arc::clone(&self.stats),
            };
            workers.spawn(worker.run(stop.clone()));
        }

        let mut failure = None;
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "worker task failed, stopping pool");
                stop.cancel();
                failure.get_or_insert(RunnerError::Task(e));
            }
        }

        info!(
            succeeded = self.stats.succeeded.load(Ordering::Relaxed),
            failed = self.stats.failed.load(Ordering::Relaxed),
            requeued = self.stats.requeued.load(Ordering::Relaxed),
            "worker pool stopped"
        );

        failure.map_or(Ok(()), Err)
    }
}

struct Worker {
    id: usize,
    queue: Arc<dyn JobQueue>,
    scraper: Arc<dyn Scraper>,
    results: Arc<dyn ResultWriter>,
    stats: Arc<PoolStats>,
}

impl Worker {
    async fn run(self, cancel: CancellationToken) {
        debug!(worker = self.id, "worker started");

        loop {
            let job = match self.queue.next_job(&cancel).await {
                Ok(Some(job)) => job,
                Ok(None) => break,
                Err(e) => {
                    error!(worker = self.id, error = %e, "failed to fetch job");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(QUEUE_ERROR_BACKOFF) => continue,
                    }
                }
            };

            self.process(job, &cancel).await;
        }

        debug!(worker = self.id, "worker stopped");
    }

    async fn process(&self, job: Job, cancel: &CancellationToken) {
        info!(worker = self.id, job_id = %job.id(), query = %job.query(), "processing job");

        let status = match self.scraper.scrape(&job, cancel).await {
            Ok(entries) => match self.results.write(&job, &entries).await {
                Ok(()) => {
                    info!(job_id = %job.id(), entries = entries.len(), "job finished");
                    self.stats.succeeded.fetch_add(1, Ordering::Relaxed);
                    JobStatus::Ok
                }
                Err(e) => {
                    error!(job_id = %job.id(), error = %e, "failed to store results");
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    JobStatus::Failed
                }
            },
            Err(ScrapeError::Cancelled) => {
                warn!(job_id = %job.id(), "job interrupted by shutdown, returning it to the queue");
                self.stats.requeued.fetch_add(1, Ordering::Relaxed);
                JobStatus::New
            }
            Err(e) => {
                error!(job_id = %job.id(), error = %e, "scrape failed");
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                JobStatus::Failed
            }
        };

        if let Err(e) = self.queue.complete(job.id(), status).await {
            error!(job_id = %job.id(), status = %status, error = %e, "failed to record job status");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake::FakeScraper;
    use crate::repository::{JobFileResultWriter, MemoryJobStore};
    use mapscraper_core::domain::job::JobParams;
    use mapscraper_core::queue::Provider;

    fn job(id: &str, query: &str) -> Job {
        Job::new(id, JobParams::new(query, "en", 1, false, "", 10).unwrap())
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        for _ in 0..200 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_pool_drains_queue_until_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryJobStore::new());
        let scraper = Arc::new(FakeScraper {
            failing_query: Some("broken".to_string()),
            ..Default::default()
        });
        let writer = Arc::new(JobFileResultWriter::new(dir.path()));

        for (id, query) in [("a", "pizza"), ("b", "broken"), ("c", "tacos")] {
            store.push(&job(id, query), &CancellationToken::new()).await.unwrap();
        }

        let pool = Arc::new(WorkerPool::new(store.clone(), scraper.clone(), writer.clone(), 2));
        let cancel = CancellationToken::new();
        let handle = {
            let pool = pool.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { pool.run(cancel).await })
        };

        wait_until(|| scraper.seen().len() == 3).await;
        wait_until(|| {
            pool.stats().succeeded.load(Ordering::SeqCst) == 2
                && pool.stats().failed.load(Ordering::SeqCst) == 1
        })
        .await;

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("pool did not stop after cancellation")
            .unwrap()
            .unwrap();

        assert!(writer.path_for("a").exists());
        assert!(!writer.path_for("b").exists());
        assert!(writer.path_for("c").exists());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_interrupted_job_is_requeued() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryJobStore::new());
        let scraper = Arc::new(FakeScraper {
            delay: Some(Duration::from_secs(30)),
            ..Default::default()
        });
        let writer = Arc::new(JobFileResultWriter::new(dir.path()));
        store.push(&job("slow", "pizza"), &CancellationToken::new()).await.unwrap();

        let pool = WorkerPool::new(store.clone(), scraper, writer, 1);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        tokio::time::timeout(Duration::from_secs(2), pool.run(cancel))
            .await
            .expect("pool did not stop after cancellation")
            .unwrap();

        assert_eq!(pool.stats().requeued.load(Ordering::SeqCst), 1);
        assert_eq!(store.len().await, 1);
    }
}
