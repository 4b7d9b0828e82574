//! Dependency install mode

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::engine::{ScrapeError, Scraper};
use crate::error::RunnerError;
use crate::runner::Runner;

/// Installs the scraping engine's dependencies and exits
pub struct InstallRunner {
    scraper: Arc<dyn Scraper>,
}

impl InstallRunner {
    pub fn new(scraper: Arc<dyn Scraper>) -> Self {
        Self { scraper }
    }
}

#[async_trait]
impl Runner for InstallRunner {
    async fn run(&self, cancel: CancellationToken) -> Result<(), RunnerError> {
        match self.scraper.install(&cancel).await {
            Ok(()) => {
                info!("engine dependencies installed");
                Ok(())
            }
            Err(ScrapeError::Cancelled) => Err(RunnerError::Cancelled),
            Err(e) => Err(e.into()),
        }
    }

    async fn close(&self) -> Result<(), RunnerError> {
        Ok(())
    }
}
