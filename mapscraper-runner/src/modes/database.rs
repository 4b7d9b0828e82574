//! Database modes
//!
//! `database` consumes the process job store until cancelled and stores
//! entries in the `results` table. `database-produce` seeds the store from an
//! input file and exits. The store is the one the ingestion API pushes to.

use async_trait::async_trait;
use mapscraper_core::queue::QueueError;
use sqlx::PgPool;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::JobTemplate;
use crate::engine::Scraper;
use crate::error::RunnerError;
use crate::input::read_jobs;
use crate::repository::{JobStore, PostgresResultWriter};
use crate::runner::Runner;
use crate::scheduler::WorkerPool;

/// What a database runner does with the queue
#[derive(Debug, Clone)]
pub enum DatabaseRole {
    Consume { concurrency: usize },
    Produce { input: PathBuf, template: JobTemplate },
}

pub struct DatabaseRunner {
    role: DatabaseRole,
    pool: PgPool,
    store: JobStore,
    scraper: Arc<dyn Scraper>,
}

impl DatabaseRunner {
    /// # Arguments
    /// * `pool` - Holds the `results` table; closed by `close`
    /// * `store` - Job store shared with the ingestion API
    pub fn new(role: DatabaseRole, pool: PgPool, store: JobStore, scraper: Arc<dyn Scraper>) -> Self {
        Self {
            role,
            pool,
            store,
            scraper,
        }
    }

    async fn produce(
        &self,
        input: &std::path::Path,
        template: &JobTemplate,
        cancel: &CancellationToken,
    ) -> Result<(), RunnerError> {
        let jobs = read_jobs(input, template).await?;
        let total = jobs.len();
        info!(input = %input.display(), jobs = total, "seeding job queue");

        for (pushed, job) in jobs.iter().enumerate() {
            match self.store.provider.push(job, cancel).await {
                Ok(()) => debug!(job_id = %job.id(), "job queued"),
                Err(QueueError::Cancelled) => {
                    info!(pushed, total, "seeding interrupted");
                    return Err(RunnerError::Cancelled);
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!(jobs = total, "job queue seeded");
        Ok(())
    }
}

#[async_trait]
impl Runner for DatabaseRunner {
    async fn run(&self, cancel: CancellationToken) -> Result<(), RunnerError> {
        match &self.role {
            DatabaseRole::Consume { concurrency } => {
                let results = Arc::new(PostgresResultWriter::new(self.pool.clone()));
                let workers = WorkerPool::new(
                    Arc::clone(&self.store.queue),
                    Arc::clone(&self.scraper),
                    results,
                    *concurrency,
                );
                workers.run(cancel).await
            }
            DatabaseRole::Produce { input, template } => {
                self.produce(input, template, &cancel).await
            }
        }
    }

    async fn close(&self) -> Result<(), RunnerError> {
        self.pool.close().await;
        debug!("database pool closed");
        Ok(())
    }
}
