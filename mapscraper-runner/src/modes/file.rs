//! Batch file mode
//!
//! Reads every query from the input file, scrapes them with bounded
//! concurrency and appends the entries to one JSON-lines results file.

use async_trait::async_trait;
use mapscraper_core::domain::job::Job;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::JobTemplate;
use crate::engine::{ScrapeError, Scraper};
use crate::error::RunnerError;
use crate::input::read_jobs;
use crate::repository::{JsonlResultWriter, ResultWriter};
use crate::runner::Runner;

enum JobOutcome {
    Done,
    Failed,
    Interrupted,
}

pub struct FileRunner {
    input: PathBuf,
    template: JobTemplate,
    concurrency: usize,
    scraper: Arc<dyn Scraper>,
    writer: Arc<JsonlResultWriter>,
}

impl FileRunner {
    pub fn new(
        input: PathBuf,
        results: PathBuf,
        template: JobTemplate,
        concurrency: usize,
        scraper: Arc<dyn Scraper>,
    ) -> Self {
        Self {
            input,
            template,
            concurrency: concurrency.max(1),
            scraper,
            writer: Arc::new(JsonlResultWriter::new(results)),
        }
    }
}

async fn scrape_one(
    job: Job,
    scraper: Arc<dyn Scraper>,
    writer: Arc<JsonlResultWriter>,
    cancel: CancellationToken,
) -> JobOutcome {
    match scraper.scrape(&job, &cancel).await {
        Ok(entries) => match writer.write(&job, &entries).await {
            Ok(()) => {
                info!(job_id = %job.id(), entries = entries.len(), "job finished");
                JobOutcome::Done
            }
            Err(e) => {
                error!(job_id = %job.id(), error = %e, "failed to write results");
                JobOutcome::Failed
            }
        },
        Err(ScrapeError::Cancelled) => JobOutcome::Interrupted,
        Err(e) => {
            error!(job_id = %job.id(), error = %e, "scrape failed");
            JobOutcome::Failed
        }
    }
}

#[async_trait]
impl Runner for FileRunner {
    async fn run(&self, cancel: CancellationToken) -> Result<(), RunnerError> {
        let jobs = read_jobs(&self.input, &self.template).await?;
        let total = jobs.len();
        info!(
            input = %self.input.display(),
            jobs = total,
            concurrency = self.concurrency,
            "starting batch run"
        );

        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        let mut interrupted = false;

        for job in jobs {
            let permit = tokio::select! {
                _ = cancel.cancelled() => {
                    interrupted = true;
                    break;
                }
                permit = Arc::clone(&permits).acquire_owned() => permit,
            };
            let Ok(permit) = permit else { break };

            let scraper = Arc::clone(&self.scraper);
            let writer = Arc::clone(&self.writer);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let _permit = permit;
                scrape_one(job, scraper, writer, cancel).await
            });
        }

        let (mut done, mut failed) = (0, 0);
        while let Some(joined) = tasks.join_next().await {
            match joined? {
                JobOutcome::Done => done += 1,
                JobOutcome::Failed => failed += 1,
                JobOutcome::Interrupted => interrupted = true,
            }
        }

        if interrupted {
            warn!(done, failed, total, "batch run interrupted");
            return Err(RunnerError::Cancelled);
        }

        info!(done, failed, total, "batch run finished");
        Ok(())
    }

    async fn close(&self) -> Result<(), RunnerError> {
        self.writer.flush().await
    }
}
