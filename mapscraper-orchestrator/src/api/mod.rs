//! API Module
//!
//! HTTP API layer of the orchestrator.
//! Each submodule handles the endpoints of one concern.

pub mod error;
pub mod health;
pub mod job;

use axum::{
    Router,
    routing::{any, get},
};
use mapscraper_core::queue::Provider;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::telemetry::Telemetry;

/// State shared by the handlers
#[derive(Clone)]
pub struct AppState {
    /// Job store fed by `POST /api/jobs`; `None` when the run mode has no
    /// consumer for ingested jobs
    pub provider: Option<Arc<dyn Provider>>,
    /// Root token of the process; in-flight pushes give up when it fires
    pub shutdown: CancellationToken,
    pub telemetry: Telemetry,
}

/// Correlation id of one request, echoed in every job API response
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Job ingestion; the handler answers other methods itself
        .route("/api/jobs", any(job::create_job))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
