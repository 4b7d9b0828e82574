//! Runner factory
//!
//! Turns a run-mode selector into exactly one runner. Construction does no
//! I/O: connections are opened lazily and input files are read by `run`.

use mapscraper_client::{FunctionClient, RuntimeClient};
use mapscraper_core::domain::run_mode::RunMode;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

use crate::config::RunnerConfig;
use crate::engine::Scraper;
use crate::error::RunnerError;
use crate::modes::{
    DatabaseRole, DatabaseRunner, FileRunner, FunctionRunner, InstallRunner, InvokerRunner,
    WebRunner,
};
use crate::repository::JobStore;
use crate::runner::{ManagedRunner, Runner};

/// Collaborators handed to the runners
#[derive(Clone)]
pub struct RunnerDeps {
    pub config: RunnerConfig,
    pub scraper: Arc<dyn Scraper>,
    /// Process job store, shared with the ingestion API; consumed by the
    /// web-service and database modes
    pub store: Option<JobStore>,
    /// Postgres pool, required by the database modes
    pub pool: Option<PgPool>,
}

pub struct RunnerFactory {
    deps: RunnerDeps,
}

impl RunnerFactory {
    pub fn new(deps: RunnerDeps) -> Self {
        Self { deps }
    }

    /// Resolves a selector such as `"web-service"`.
    ///
    /// An unknown selector fails with [`RunnerError::InvalidRunMode`]
    /// carrying the offending value.
    pub fn resolve(&self, selector: &str) -> Result<ManagedRunner, RunnerError> {
        let mode: RunMode = selector
            .parse()
            .map_err(|_| RunnerError::InvalidRunMode(selector.to_string()))?;
        self.create(mode)
    }

    pub fn create(&self, mode: RunMode) -> Result<ManagedRunner, RunnerError> {
        let config = &self.deps.config;
        let scraper = Arc::clone(&self.deps.scraper);

        let runner: Box<dyn Runner> = match mode {
            RunMode::File => Box::new(FileRunner::new(
                config.require_input()?,
                config.results_file.clone(),
                config.template.clone(),
                config.concurrency,
                scraper,
            )),
            RunMode::Database => Box::new(DatabaseRunner::new(
                DatabaseRole::Consume {
                    concurrency: config.concurrency,
                },
                self.require_pool()?,
                self.require_store()?,
                scraper,
            )),
            RunMode::DatabaseProduce => Box::new(DatabaseRunner::new(
                DatabaseRole::Produce {
                    input: config.require_input()?,
                    template: config.template.clone(),
                },
                self.require_pool()?,
                self.require_store()?,
                scraper,
            )),
            RunMode::InstallDependency => Box::new(InstallRunner::new(scraper)),
            RunMode::WebService => Box::new(WebRunner::new(
                self.require_store()?.queue,
                scraper,
                config.data_folder.clone(),
                config.concurrency,
            )),
            RunMode::ServerlessFunction => Box::new(FunctionRunner::new(
                RuntimeClient::new(config.require_runtime_api()?),
                scraper,
            )),
            RunMode::ServerlessInvoker => Box::new(InvokerRunner::new(
                FunctionClient::new(config.require_function_url()?),
                config.require_input()?,
                config.results_file.clone(),
                config.template.clone(),
                config.chunk_size,
            )),
        };

        info!(mode = %mode, "runner created");
        Ok(ManagedRunner::new(mode, runner))
    }

    fn require_pool(&self) -> Result<PgPool, RunnerError> {
        self.deps
            .pool
            .clone()
            .ok_or(RunnerError::MissingConfig("database url"))
    }

    fn require_store(&self) -> Result<JobStore, RunnerError> {
        self.deps
            .store
            .clone()
            .ok_or(RunnerError::MissingConfig("job queue"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake::FakeScraper;
    use crate::repository::MemoryJobStore;
    use crate::runner::RunnerState;

    fn deps(config: RunnerConfig, pool: Option<PgPool>) -> RunnerDeps {
        RunnerDeps {
            config,
            scraper: Arc::new(FakeScraper::default()),
            store: Some(JobStore::new(Arc::new(MemoryJobStore::new()))),
            pool,
        }
    }

    fn full_config() -> RunnerConfig {
        RunnerConfig {
            input_file: Some("queries.txt".into()),
            function_url: Some("http://function.local/invoke".to_string()),
            runtime_api: Some("127.0.0.1:9001".to_string()),
            ..RunnerConfig::default()
        }
    }

    #[test]
    fn test_unknown_selector_is_rejected_with_value() {
        let factory = RunnerFactory::new(deps(RunnerConfig::default(), None));

        let err = factory.resolve("bogus-mode").unwrap_err();
        assert!(matches!(err, RunnerError::InvalidRunMode(ref v) if v == "bogus-mode"));
        assert_eq!(err.to_string(), "invalid run mode: bogus-mode");
    }

    #[tokio::test]
    async fn test_every_mode_resolves_when_configured() {
        let pool = crate::db::create_pool("postgres://localhost/mapscraper", 1).unwrap();
        let factory = RunnerFactory::new(deps(full_config(), Some(pool)));

        for mode in RunMode::ALL {
            let runner = factory.resolve(mode.as_str()).unwrap();
            assert_eq!(runner.mode(), mode);
            assert_eq!(runner.state(), RunnerState::Created);
        }
    }

    #[test]
    fn test_missing_settings_fail_construction() {
        let factory = RunnerFactory::new(deps(RunnerConfig::default(), None));

        assert!(matches!(
            factory.create(RunMode::File),
            Err(RunnerError::MissingConfig("input file"))
        ));
        assert!(matches!(
            factory.create(RunMode::Database),
            Err(RunnerError::MissingConfig("database url"))
        ));
        assert!(matches!(
            factory.create(RunMode::ServerlessInvoker),
            Err(RunnerError::MissingConfig("function url"))
        ));
        assert!(matches!(
            factory.create(RunMode::ServerlessFunction),
            Err(RunnerError::MissingConfig("runtime api address"))
        ));
        assert!(factory.create(RunMode::WebService).is_ok());
        assert!(factory.create(RunMode::InstallDependency).is_ok());
    }

    #[tokio::test]
    async fn test_consumer_modes_need_a_job_store() {
        let pool = crate::db::create_pool("postgres://localhost/mapscraper", 1).unwrap();
        let factory = RunnerFactory::new(RunnerDeps {
            store: None,
            ..deps(full_config(), Some(pool))
        });

        for mode in [RunMode::WebService, RunMode::Database, RunMode::DatabaseProduce] {
            assert!(matches!(
                factory.create(mode),
                Err(RunnerError::MissingConfig("job queue"))
            ));
        }
        assert!(factory.create(RunMode::File).is_ok());
        assert!(factory.create(RunMode::ServerlessInvoker).is_ok());
    }
}
