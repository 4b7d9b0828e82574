//! Runner contract
//!
//! A runner owns all work of one run mode. The coordinator drives it through
//! [`ManagedRunner`], which enforces the lifecycle
//! `Created → Running → {Completed, Failed} → Closed`:
//! - `run` may only start once
//! - `close` may be called from any state and only reaches the backend once

use async_trait::async_trait;
use mapscraper_core::domain::run_mode::RunMode;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::RunnerError;

/// Execution backend contract
#[async_trait]
pub trait Runner: Send + Sync {
    /// Performs the backend's whole unit of work.
    ///
    /// Must return promptly once `cancel` fires.
    async fn run(&self, cancel: CancellationToken) -> Result<(), RunnerError>;

    /// Releases backend resources.
    ///
    /// Must tolerate being called after a failed run, or with no run at all.
    async fn close(&self) -> Result<(), RunnerError>;
}

/// Lifecycle state of a managed runner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Created,
    Running,
    Completed,
    Failed,
    Closed,
}

/// A runner together with its lifecycle state
pub struct ManagedRunner {
    mode: RunMode,
    inner: Box<dyn Runner>,
    state: Mutex<RunnerState>,
}

impl std::fmt::Debug for ManagedRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedRunner")
            .field("mode", &self.mode)
            .field("state", &self.state())
            .finish()
    }
}

impl ManagedRunner {
    pub fn new(mode: RunMode, inner: Box<dyn Runner>) -> Self {
        Self {
            mode,
            inner,
            state: Mutex::new(RunnerState::Created),
        }
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn state(&self) -> RunnerState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, next: RunnerState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = next;
    }

    /// Runs the backend once
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), RunnerError> {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if *state != RunnerState::Created {
                return Err(RunnerError::InvalidState(*state));
            }
            *state = RunnerState::Running;
        }

        info!(mode = %self.mode, "runner started");

        let result = self.inner.run(cancel).await;

        // A close racing with run wins; keep Closed terminal.
        if self.state() == RunnerState::Running {
            match &result {
                Ok(()) => self.set_state(RunnerState::Completed),
                Err(_) => self.set_state(RunnerState::Failed),
            }
        }

        match &result {
            Ok(()) => info!(mode = %self.mode, "runner completed"),
            Err(e) => warn!(mode = %self.mode, error = %e, "runner failed"),
        }

        result
    }

    /// Closes the backend; later calls are no-ops
    pub async fn close(&self) -> Result<(), RunnerError> {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if *state == RunnerState::Closed {
                debug!(mode = %self.mode, "runner already closed");
                return Ok(());
            }
            *state = RunnerState::Closed;
        }

        info!(mode = %self.mode, "closing runner");
        self.inner.close().await
    }
}
