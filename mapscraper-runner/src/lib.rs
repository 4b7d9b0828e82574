//! Mapscraper Runner
//!
//! Execution backends for scrape jobs.
//!
//! Architecture:
//! - Runner: the lifecycle contract every backend implements (`run`, `close`)
//! - Factory: resolves a run-mode selector to exactly one runner
//! - Modes: one runner per run mode (batch file, database consumer/producer,
//!   dependency install, web service, serverless function and invoker)
//! - Repositories: queue backends (Postgres, in-memory) and result writers
//! - Engine: adapter to the external scraping engine
//! - Scheduler: worker pool draining a job queue
//!
//! Every blocking point inside a runner observes the root cancellation token
//! handed to `run`.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod factory;
pub mod input;
pub mod modes;
pub mod repository;
pub mod runner;
pub mod scheduler;

pub use error::RunnerError;
pub use factory::{RunnerDeps, RunnerFactory};
pub use runner::{ManagedRunner, Runner, RunnerState};
