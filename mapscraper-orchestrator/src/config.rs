//! Process configuration
//!
//! Every setting is a command-line flag with an environment fallback.
//! Runner-side settings are handed on as a [`RunnerConfig`].

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use mapscraper_core::domain::run_mode::RunMode;
use mapscraper_runner::config::{JobTemplate, RunnerConfig};
use mapscraper_runner::engine::EngineCommand;
use std::path::PathBuf;
use std::time::Duration;

/// Backing store of the job queue fed by `POST /api/jobs`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum QueueBackend {
    /// Process memory; queued jobs are lost on exit
    Memory,
    /// The `gmaps_jobs` table; survives restarts
    Postgres,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "mapscraper")]
#[command(about = "Google Maps scraping job orchestrator", long_about = None)]
pub struct Config {
    /// Run mode: file, database, database-produce, install-dependency,
    /// web-service, serverless-function or serverless-invoker
    #[arg(long, env = "MAPSCRAPER_MODE", default_value = "web-service")]
    pub mode: String,

    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL")]
    pub dsn: Option<String>,

    #[arg(long, env = "MAPSCRAPER_DB_MAX_CONNECTIONS", default_value_t = 10)]
    pub db_max_connections: u32,

    /// Job queue backend; derived from the mode and `--dsn` when unset
    #[arg(long, value_enum, env = "MAPSCRAPER_QUEUE")]
    pub queue: Option<QueueBackend>,

    /// Listen address of the HTTP API
    #[arg(long, env = "MAPSCRAPER_ADDR", default_value = "0.0.0.0:8080")]
    pub addr: String,

    /// Query file, one query per line
    #[arg(long, env = "MAPSCRAPER_INPUT")]
    pub input: Option<PathBuf>,

    #[arg(long, env = "MAPSCRAPER_RESULTS", default_value = "results.jsonl")]
    pub results: PathBuf,

    #[arg(long, env = "MAPSCRAPER_DATA_FOLDER", default_value = "webdata")]
    pub data_folder: PathBuf,

    /// Jobs scraped at once (defaults to half the CPUs)
    #[arg(long, env = "MAPSCRAPER_CONCURRENCY")]
    pub concurrency: Option<usize>,

    #[arg(long, env = "MAPSCRAPER_DEPTH", default_value_t = 10)]
    pub depth: i64,

    #[arg(long, env = "MAPSCRAPER_LANG", default_value = "en")]
    pub lang: String,

    #[arg(long, env = "MAPSCRAPER_ZOOM", default_value_t = 15)]
    pub zoom: i64,

    /// "lat,lon" to center searches on
    #[arg(long, env = "MAPSCRAPER_GEO", default_value = "")]
    pub geo: String,

    #[arg(long, env = "MAPSCRAPER_EMAIL")]
    pub email: bool,

    /// Scraping engine command line
    #[arg(long, env = "MAPSCRAPER_ENGINE", default_value = "gmaps-engine")]
    pub engine: String,

    /// Invocation URL of the deployed function (serverless-invoker)
    #[arg(long, env = "MAPSCRAPER_FUNCTION_URL")]
    pub function_url: Option<String>,

    /// Runtime API address (serverless-function)
    #[arg(long, env = "AWS_LAMBDA_RUNTIME_API")]
    pub runtime_api: Option<String>,

    /// Queries per function invocation
    #[arg(long, env = "MAPSCRAPER_CHUNK_SIZE", default_value_t = 10)]
    pub chunk_size: usize,

    /// Milliseconds between polls of an empty database queue
    #[arg(long, env = "MAPSCRAPER_POLL_INTERVAL_MS", default_value_t = 1000)]
    pub poll_interval_ms: u64,

    /// Seconds granted to the server drain and runner close on shutdown
    #[arg(long, env = "MAPSCRAPER_SHUTDOWN_GRACE", default_value_t = 5)]
    pub shutdown_grace_secs: u64,

    /// HTTP endpoint receiving telemetry batches; events are only logged if unset
    #[arg(long, env = "MAPSCRAPER_TELEMETRY_ENDPOINT")]
    pub telemetry_endpoint: Option<String>,
}

impl Config {
    /// Rejects settings no run mode can work with
    pub fn validate(&self) -> Result<()> {
        self.queue_backend()?;
        if self.concurrency == Some(0) {
            bail!("concurrency must be at least 1");
        }
        if self.chunk_size == 0 {
            bail!("chunk size must be at least 1");
        }
        if self.poll_interval_ms == 0 {
            bail!("poll interval must be greater than zero");
        }
        if self.db_max_connections == 0 {
            bail!("database pool needs at least one connection");
        }
        if self.engine.trim().is_empty() {
            bail!("engine command is empty");
        }
        Ok(())
    }

    /// Backend of the job store shared by the ingestion API and the runner.
    ///
    /// `None` means the process accepts no jobs: the run mode has no consumer
    /// and no database was given to hold them for one.
    /// - database modes always use Postgres
    /// - web-service drains the store itself, so memory is allowed
    /// - other modes only accept jobs into Postgres, for a database consumer
    pub fn queue_backend(&self) -> Result<Option<QueueBackend>> {
        let mode = self.mode.parse::<RunMode>().ok();
        let database_mode = matches!(mode, Some(RunMode::Database | RunMode::DatabaseProduce));

        let backend = match self.queue {
            Some(QueueBackend::Memory) if database_mode => {
                bail!("{} mode uses the postgres queue", self.mode)
            }
            Some(QueueBackend::Memory) if mode != Some(RunMode::WebService) => {
                bail!(
                    "the memory queue has no consumer in {} mode; use --queue postgres",
                    self.mode
                )
            }
            Some(backend) => Some(backend),
            None if database_mode || self.dsn.is_some() => Some(QueueBackend::Postgres),
            None if mode == Some(RunMode::WebService) => Some(QueueBackend::Memory),
            None => None,
        };

        if backend == Some(QueueBackend::Postgres) && self.dsn.is_none() {
            bail!("--dsn is required with the postgres queue");
        }
        Ok(backend)
    }

    /// Whether the job store lives in Postgres and needs its schema
    pub fn needs_database(&self) -> bool {
        matches!(self.queue_backend(), Ok(Some(QueueBackend::Postgres)))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn engine_command(&self) -> Result<EngineCommand> {
        EngineCommand::parse(&self.engine).context("engine command is empty")
    }

    pub fn runner_config(&self) -> RunnerConfig {
        let defaults = RunnerConfig::default();

        RunnerConfig {
            input_file: self.input.clone(),
            results_file: self.results.clone(),
            data_folder: self.data_folder.clone(),
            concurrency: self.concurrency.unwrap_or(defaults.concurrency),
            template: JobTemplate {
                language: self.lang.clone(),
                max_depth: self.depth,
                extract_email: self.email,
                geo_coordinates: self.geo.clone(),
                zoom: self.zoom,
            },
            function_url: self.function_url.clone(),
            runtime_api: self.runtime_api.clone(),
            chunk_size: self.chunk_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("mapscraper").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]);
        assert_eq!(config.queue_backend().unwrap(), Some(QueueBackend::Memory));
        assert_eq!(config.shutdown_grace(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
        assert!(!config.needs_database());

        let runner = config.runner_config();
        assert_eq!(runner.template.language, "en");
        assert_eq!(runner.chunk_size, 10);
        assert!(runner.concurrency >= 1);
    }

    #[test]
    fn test_postgres_queue_requires_dsn() {
        let config = parse(&["--queue", "postgres"]);
        assert!(config.validate().is_err());

        let config = parse(&["--queue", "postgres", "--dsn", "postgres://localhost/db"]);
        assert!(config.validate().is_ok());
        assert!(config.needs_database());
    }

    #[test]
    fn test_database_modes_need_schema() {
        let dsn = "postgres://localhost/db";
        assert!(parse(&["--mode", "database", "--dsn", dsn]).needs_database());
        assert!(parse(&["--mode", "database-produce", "--dsn", dsn]).needs_database());
        assert!(!parse(&["--mode", "file"]).needs_database());
        assert!(!parse(&["--mode", "not-a-mode"]).needs_database());
    }

    #[test]
    fn test_database_modes_queue_into_postgres() {
        for mode in ["database", "database-produce"] {
            let config = parse(&["--mode", mode, "--dsn", "postgres://localhost/db"]);
            assert!(config.validate().is_ok());
            assert_eq!(config.queue_backend().unwrap(), Some(QueueBackend::Postgres));

            let config = parse(&["--mode", mode, "--dsn", "postgres://localhost/db", "--queue", "memory"]);
            assert!(config.validate().is_err());

            assert!(parse(&["--mode", mode]).validate().is_err());
        }
    }

    #[test]
    fn test_memory_queue_needs_an_in_process_consumer() {
        for mode in ["file", "install-dependency", "serverless-function", "serverless-invoker"] {
            assert!(parse(&["--mode", mode, "--queue", "memory"]).validate().is_err());

            // Without a database these modes accept no jobs at all
            let config = parse(&["--mode", mode]);
            assert!(config.validate().is_ok());
            assert_eq!(config.queue_backend().unwrap(), None);

            // With one, ingested jobs wait in Postgres for a database consumer
            let config = parse(&["--mode", mode, "--dsn", "postgres://localhost/db"]);
            assert_eq!(config.queue_backend().unwrap(), Some(QueueBackend::Postgres));
        }

        let config = parse(&["--mode", "web-service", "--queue", "memory"]);
        assert_eq!(config.queue_backend().unwrap(), Some(QueueBackend::Memory));
    }

    #[test]
    fn test_rejects_zero_sizes() {
        assert!(parse(&["--concurrency", "0"]).validate().is_err());
        assert!(parse(&["--chunk-size", "0"]).validate().is_err());
        assert!(parse(&["--engine", "  "]).validate().is_err());
    }
}
