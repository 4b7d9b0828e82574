//! Scraping engine adapter
//!
//! The page-scraping engine is an external collaborator. Runners only see
//! the [`Scraper`] trait; [`ProcessScraper`] drives an engine executable:
//! - scrape: the job is written as one JSON line on stdin, the engine prints
//!   one JSON entry per line on stdout and exits 0
//! - install: the engine is run with its install arguments and must exit 0

mod process;

pub use process::{EngineCommand, ProcessScraper};

use async_trait::async_trait;
use mapscraper_core::domain::job::Job;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Errors raised by the scraping engine
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("scrape cancelled")]
    Cancelled,

    #[error("failed to start engine: {0}")]
    Spawn(std::io::Error),

    #[error("engine I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("engine exited with {0}")]
    Failed(std::process::ExitStatus),

    #[error("engine produced invalid output: {0}")]
    Output(#[from] serde_json::Error),
}

/// Engine contract used by the runners
#[async_trait]
pub trait Scraper: Send + Sync {
    /// Scrapes one job and returns its entries.
    ///
    /// Returns [`ScrapeError::Cancelled`] promptly once `cancel` fires.
    async fn scrape(&self, job: &Job, cancel: &CancellationToken) -> Result<Vec<Value>, ScrapeError>;

    /// Installs the engine's own dependencies
    async fn install(&self, cancel: &CancellationToken) -> Result<(), ScrapeError>;
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Scraper returning one entry per job, optionally failing some queries
    #[derive(Default)]
    pub struct FakeScraper {
        pub delay: Option<Duration>,
        pub failing_query: Option<String>,
        pub seen: Mutex<Vec<String>>,
        pub installs: Mutex<usize>,
    }

    impl FakeScraper {
        pub fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Scraper for FakeScraper {
        async fn scrape(
            &self,
            job: &Job,
            cancel: &CancellationToken,
        ) -> Result<Vec<Value>, ScrapeError> {
            if let Some(delay) = self.delay {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(ScrapeError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            self.seen.lock().unwrap().push(job.id().to_string());
            if self.failing_query.as_deref() == Some(job.query()) {
                return Err(ScrapeError::Io(std::io::Error::other("boom")));
            }
            Ok(vec![serde_json::json!({ "title": job.query() })])
        }

        async fn install(&self, _cancel: &CancellationToken) -> Result<(), ScrapeError> {
            *self.installs.lock().unwrap() += 1;
            Ok(())
        }
    }
}
