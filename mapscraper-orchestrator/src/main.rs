//! Mapscraper
//!
//! Entry point of the scraping job system. One process runs exactly one
//! runner, selected by `--mode`, next to the job ingestion API.
//!
//! Architecture:
//! - Configuration: flags with environment fallbacks
//! - API: `POST /api/jobs` validates requests and pushes jobs to the queue
//! - Server: hosts the API with fixed transport timeouts
//! - Lifecycle: signals, supervised tasks, runner run/close, telemetry flush
//!
//! Exit code 0 means the runner finished cleanly; anything else exits 1.

mod api;
mod config;
mod lifecycle;
mod server;
mod telemetry;

use anyhow::{Context, Result};
use clap::Parser;
use mapscraper_core::queue::Provider;
use mapscraper_runner::db;
use mapscraper_runner::engine::ProcessScraper;
use mapscraper_runner::repository::{JobStore, MemoryJobStore, PostgresJobStore};
use mapscraper_runner::{RunnerDeps, RunnerFactory};
use sqlx::PgPool;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::AppState;
use crate::config::{Config, QueueBackend};
use crate::lifecycle::{EXIT_FAILURE, LifecycleCoordinator};
use crate::server::{Server, Timeouts};
use crate::telemetry::{HttpSink, LogSink, Telemetry, TelemetrySink};

const TELEMETRY_FLUSH_INTERVAL: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "mapscraper=info,mapscraper_runner=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::parse();
    info!(mode = %config.mode, "Starting mapscraper");

    let sink: Arc<dyn TelemetrySink> = match &config.telemetry_endpoint {
        Some(endpoint) => match HttpSink::new(endpoint.clone()) {
            Ok(sink) => Arc::new(sink),
            Err(e) => {
                error!(error = %e, "failed to set up telemetry export");
                return ExitCode::from(EXIT_FAILURE);
            }
        },
        None => Arc::new(LogSink),
    };
    let telemetry = Telemetry::start(sink, TELEMETRY_FLUSH_INTERVAL);
    let mut coordinator = LifecycleCoordinator::new(telemetry.clone(), config.shutdown_grace());

    if let Err(e) = config.validate() {
        return ExitCode::from(coordinator.abort(e.context("invalid configuration")).await);
    }

    if let Err(e) = coordinator.install_signal_handlers() {
        let err = anyhow::Error::new(e).context("failed to install signal handlers");
        return ExitCode::from(coordinator.abort(err).await);
    }

    let deps = match bootstrap(&config).await {
        Ok(deps) => deps,
        Err(e) => return ExitCode::from(coordinator.abort(e).await),
    };

    if let Some(pool) = deps.pool.clone() {
        coordinator.on_shutdown(async move { pool.close().await });
    }

    let router = api::create_router(AppState {
        provider: deps.provider(),
        shutdown: coordinator.root(),
        telemetry,
    });
    let server = match Server::bind(&config.addr, router, Timeouts::default())
        .await
        .with_context(|| format!("failed to bind to {}", config.addr))
    {
        Ok(server) => server,
        Err(e) => return ExitCode::from(coordinator.abort(e).await),
    };

    let shutdown = coordinator.root();
    coordinator.supervise("http-server", async move {
        server.serve(shutdown).await.context("http server failed")
    });

    let factory = RunnerFactory::new(deps.runner);
    let code = coordinator.execute(|| factory.resolve(&config.mode)).await;

    ExitCode::from(code)
}

struct Deps {
    runner: RunnerDeps,
    pool: Option<PgPool>,
}

impl Deps {
    /// Ingestion side of the runner's job store
    fn provider(&self) -> Option<Arc<dyn Provider>> {
        self.runner.store.as_ref().map(|store| Arc::clone(&store.provider))
    }
}

/// Opens storage and builds the runner collaborators
async fn bootstrap(config: &Config) -> Result<Deps> {
    let pool = config
        .dsn
        .as_deref()
        .map(|dsn| db::create_pool(dsn, config.db_max_connections))
        .transpose()
        .context("invalid database url")?;

    if config.needs_database() {
        if let Some(pool) = &pool {
            info!("Running database migrations");
            db::run_migrations(pool)
                .await
                .context("failed to prepare database schema")?;
        }
    }

    let backend = config.queue_backend()?;
    let store = match backend {
        Some(QueueBackend::Memory) => Some(JobStore::new(Arc::new(MemoryJobStore::new()))),
        Some(QueueBackend::Postgres) => {
            let pool = pool
                .clone()
                .context("--dsn is required with the postgres queue")?;
            Some(JobStore::new(Arc::new(PostgresJobStore::new(
                pool,
                config.poll_interval(),
            ))))
        }
        None => None,
    };
    match backend {
        Some(queue) => info!(?queue, "Job queue ready"),
        None => info!(mode = %config.mode, "No job queue, job ingestion disabled"),
    }

    let scraper = Arc::new(ProcessScraper::new(config.engine_command()?));

    Ok(Deps {
        runner: RunnerDeps {
            config: config.runner_config(),
            scraper,
            store,
            pool: pool.clone(),
        },
        pool,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapscraper_core::domain::job::{Job, JobParams, JobStatus};
    use tokio_util::sync::CancellationToken;

    fn config(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("mapscraper").chain(args.iter().copied())).unwrap()
    }

    async fn assert_ingested_jobs_reach_runner(deps: &Deps) {
        let cancel = CancellationToken::new();
        let job = Job::with_generated_id(JobParams::new("pizza", "en", 1, false, "", 10).unwrap());

        let provider = deps.provider().expect("ingestion disabled");
        provider.push(&job, &cancel).await.unwrap();

        let queue = &deps.runner.store.as_ref().unwrap().queue;
        let mut taken = queue.next_job(&cancel).await.unwrap().unwrap();
        while taken.id() != job.id() {
            queue.complete(taken.id(), JobStatus::Ok).await.unwrap();
            taken = queue.next_job(&cancel).await.unwrap().unwrap();
        }
        queue.complete(taken.id(), JobStatus::Ok).await.unwrap();
    }

    #[tokio::test]
    async fn test_web_service_runner_drains_what_the_api_pushes() {
        let deps = bootstrap(&config(&["--mode", "web-service"])).await.unwrap();
        assert_ingested_jobs_reach_runner(&deps).await;
    }

    #[tokio::test]
    async fn test_modes_without_consumer_accept_no_jobs() {
        for mode in ["file", "install-dependency", "serverless-function", "serverless-invoker"] {
            let deps = bootstrap(&config(&["--mode", mode])).await.unwrap();
            assert!(deps.provider().is_none());
            assert!(deps.runner.store.is_none());
        }
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_database_runner_drains_what_the_api_pushes() {
        let dsn = std::env::var("DATABASE_URL").unwrap();
        let deps = bootstrap(&config(&["--mode", "database", "--dsn", &dsn]))
            .await
            .unwrap();
        assert_ingested_jobs_reach_runner(&deps).await;
    }
}
