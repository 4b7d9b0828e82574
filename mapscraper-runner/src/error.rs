//! Runner error type

use mapscraper_client::ClientError;
use mapscraper_core::domain::job::ValidationError;
use mapscraper_core::queue::QueueError;

use crate::engine::ScrapeError;

/// Errors raised while resolving, running or closing a runner
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The selector names no run mode
    #[error("invalid run mode: {0}")]
    InvalidRunMode(String),

    /// A setting required by the selected run mode is absent
    #[error("missing configuration: {0}")]
    MissingConfig(&'static str),

    /// `run` was called on a runner that already left the created state
    #[error("runner cannot start from state {0:?}")]
    InvalidState(crate::runner::RunnerState),

    /// A batch run stopped before finishing its input
    #[error("run interrupted by shutdown")]
    Cancelled,

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Engine(#[from] ScrapeError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Work finished, but part of it failed
    #[error("{0}")]
    Partial(String),

    /// A spawned task panicked or was aborted
    #[error("runner task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
