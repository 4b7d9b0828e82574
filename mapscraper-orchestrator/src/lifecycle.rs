//! Process lifecycle
//!
//! The coordinator owns the root cancellation token and drives one process
//! run:
//!
//! 1. signal handlers cancel the root token on the first SIGINT or SIGTERM
//! 2. long-running tasks (the HTTP server) run under a [`Supervisor`]
//! 3. the runner is resolved, then `run` blocks until it finishes or the
//!    root token fires
//! 4. shutdown: the root token is cancelled, supervised tasks are drained
//!    within the grace period, the runner is closed, registered resources are
//!    released and telemetry is flushed last
//!
//! The exit code is 0 only when `run` returned `Ok`.

use mapscraper_runner::{ManagedRunner, RunnerError};
use serde_json::json;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::telemetry::Telemetry;

pub const EXIT_OK: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;

type Cleanup = Pin<Box<dyn Future<Output = ()> + Send>>;

// =============================================================================
// Signals
// =============================================================================

/// Listener for the process termination signals
pub struct SignalListener {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl SignalListener {
    pub fn install() -> io::Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            terminate: tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?,
        })
    }

    #[cfg(unix)]
    async fn next(&mut self) -> io::Result<&'static str> {
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
            _ = self.terminate.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    async fn next(&mut self) -> io::Result<&'static str> {
        tokio::signal::ctrl_c().await.map(|()| "SIGINT")
    }

    /// Cancels `root` on the first signal; later signals are only logged
    pub fn spawn(mut self, root: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match self.next().await {
                    Ok(name) => on_signal(&root, name),
                    Err(e) => {
                        error!(error = %e, "signal listener failed");
                        break;
                    }
                }
            }
        })
    }
}

fn on_signal(root: &CancellationToken, name: &str) {
    if root.is_cancelled() {
        warn!(signal = name, "shutdown already in progress");
    } else {
        info!(signal = name, "shutdown requested");
        root.cancel();
    }
}

// =============================================================================
// Supervisor
// =============================================================================

/// Owns the long-running tasks of the process.
///
/// A task that fails cancels the root token, which stops everything else.
pub struct Supervisor {
    root: CancellationToken,
    tasks: JoinSet<()>,
}

impl Supervisor {
    pub fn new(root: CancellationToken) -> Self {
        Self {
            root,
            tasks: JoinSet::new(),
        }
    }

    pub fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let root = self.root.clone();
        self.tasks.spawn(async move {
            match task.await {
                Ok(()) => debug!(task = name, "task finished"),
                Err(e) => {
                    error!(task = name, error = %format!("{:#}", e), "task failed, shutting down");
                    root.cancel();
                }
            }
        });
    }

    /// Cancels the root token and waits for every task.
    ///
    /// Tasks still running after `grace` are aborted. Returns how many were.
    pub async fn shutdown(mut self, grace: Duration) -> usize {
        self.root.cancel();

        let tasks = &mut self.tasks;
        let drained = tokio::time::timeout(grace, async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    error!(error = %e, "supervised task panicked");
                }
            }
        })
        .await;

        if drained.is_ok() {
            return 0;
        }

        let remaining = self.tasks.len();
        warn!(remaining, "tasks did not stop within the grace period, aborting");
        self.tasks.shutdown().await;
        remaining
    }
}

// =============================================================================
// Coordinator
// =============================================================================

pub struct LifecycleCoordinator {
    root: CancellationToken,
    supervisor: Supervisor,
    telemetry: Telemetry,
    grace: Duration,
    signals: Option<JoinHandle<()>>,
    cleanup: Vec<Cleanup>,
}

impl LifecycleCoordinator {
    /// # Arguments
    /// * `telemetry` - Flushed as the very last shutdown step
    /// * `grace` - Bound on the supervised drain and on the runner's `close`
    pub fn new(telemetry: Telemetry, grace: Duration) -> Self {
        let root = CancellationToken::new();
        Self {
            supervisor: Supervisor::new(root.clone()),
            root,
            telemetry,
            grace,
            signals: None,
            cleanup: Vec::new(),
        }
    }

    /// The root token observed by every long-running operation
    pub fn root(&self) -> CancellationToken {
        self.root.clone()
    }

    pub fn install_signal_handlers(&mut self) -> io::Result<()> {
        let listener = SignalListener::install()?;
        self.signals = Some(listener.spawn(self.root.clone()));
        Ok(())
    }

    pub fn supervise<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.supervisor.spawn(name, task);
    }

    /// Registers a resource release run after the runner is closed
    pub fn on_shutdown<F>(&mut self, release: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cleanup.push(Box::pin(release));
    }

    /// Shuts down after a startup failure
    pub async fn abort(self, err: anyhow::Error) -> u8 {
        error!(error = %format!("{:#}", err), "startup failed");
        self.telemetry
            .record("startup_failed", json!({ "error": err.to_string() }));
        self.finish(None).await;
        EXIT_FAILURE
    }

    /// Resolves the runner, runs it and shuts the process down
    pub async fn execute<R>(self, resolve: R) -> u8
    where
        R: FnOnce() -> Result<ManagedRunner, RunnerError>,
    {
        let runner = match resolve() {
            Ok(runner) => runner,
            Err(e) => {
                error!(error = %e, "failed to resolve runner");
                self.telemetry
                    .record("run_rejected", json!({ "error": e.to_string() }));
                self.finish(None).await;
                return EXIT_FAILURE;
            }
        };

        let mode = runner.mode();
        info!(mode = %mode, "runner starting");
        self.telemetry
            .record("run_started", json!({ "mode": mode.as_str() }));

        let outcome = runner.run(self.root()).await;
        let code = match &outcome {
            Ok(()) => {
                info!(mode = %mode, "run completed");
                EXIT_OK
            }
            Err(e) => {
                error!(mode = %mode, error = %e, "run failed");
                EXIT_FAILURE
            }
        };
        self.telemetry.record(
            "run_finished",
            json!({ "mode": mode.as_str(), "ok": outcome.is_ok() }),
        );

        self.finish(Some(&runner)).await;
        code
    }

    async fn finish(self, runner: Option<&ManagedRunner>) {
        let Self {
            supervisor,
            telemetry,
            grace,
            signals,
            cleanup,
            ..
        } = self;

        info!("shutting down");
        supervisor.shutdown(grace).await;

        if let Some(runner) = runner {
            match tokio::time::timeout(grace, runner.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "failed to close runner"),
                Err(_) => warn!("runner close did not finish within the grace period"),
            }
        }

        for release in cleanup {
            release.await;
        }

        if let Some(signals) = signals {
            signals.abort();
        }

        telemetry.close(grace).await;
    }
}
