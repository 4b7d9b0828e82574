//! Web service mode
//!
//! Drains the process job queue (fed by the ingestion API) and writes each
//! job's entries to `<data_folder>/<job_id>.jsonl`. Runs until cancelled.

use async_trait::async_trait;
use mapscraper_core::queue::JobQueue;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::engine::Scraper;
use crate::error::RunnerError;
use crate::repository::JobFileResultWriter;
use crate::runner::Runner;
use crate::scheduler::WorkerPool;

pub struct WebRunner {
    data_folder: PathBuf,
    pool: WorkerPool,
}

impl WebRunner {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        scraper: Arc<dyn Scraper>,
        data_folder: PathBuf,
        concurrency: usize,
    ) -> Self {
        let writer = Arc::new(JobFileResultWriter::new(data_folder.clone()));
        Self {
            data_folder,
            pool: WorkerPool::new(queue, scraper, writer, concurrency),
        }
    }
}

#[async_trait]
impl Runner for WebRunner {
    async fn run(&self, cancel: CancellationToken) -> Result<(), RunnerError> {
        tokio::fs::create_dir_all(&self.data_folder).await?;
        info!(data_folder = %self.data_folder.display(), "web service runner ready");

        self.pool.run(cancel).await
    }

    async fn close(&self) -> Result<(), RunnerError> {
        debug!("web service runner closed");
        Ok(())
    }
}
