//! Job API Handlers
//!
//! HTTP ingestion of scrape jobs.

use axum::{
    Json,
    extract::{Request, State},
    http::{Method, StatusCode},
};
use mapscraper_core::domain::job::Job;
use mapscraper_core::dto::job::{CreateJobRequest, CreateJobResponse};
use mapscraper_core::queue::QueueError;
use serde_json::json;
use tracing::{Instrument, error, info, info_span, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::api::{AppState, RequestId};

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// POST /api/jobs
/// Validate a job request and queue the job
///
/// Every call carries a request id, used for log correlation and echoed in
/// the response; it is never stored with the job. The server assigns it;
/// a request routed without one gets a fresh id here.
pub async fn create_job(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<CreateJobResponse>)> {
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .cloned()
        .unwrap_or_else(RequestId::generate)
        .0;
    let span = info_span!("create_job", handler = "create_job", request_id = %request_id);

    handle_create(state, req, request_id).instrument(span).await
}

async fn handle_create(
    state: AppState,
    req: Request,
    request_id: String,
) -> ApiResult<(StatusCode, Json<CreateJobResponse>)> {
    if req.method() != Method::POST {
        warn!(method = %req.method(), "method not allowed");
        return Err(ApiError::method_not_allowed(&request_id));
    }

    let body = axum::body::to_bytes(req.into_body(), MAX_BODY_BYTES)
        .await
        .map_err(|e| {
            warn!(error = %e, "failed to read request body");
            ApiError::bad_request("Invalid request body", &request_id)
        })?;

    let req: CreateJobRequest = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "failed to decode request body");
        ApiError::bad_request("Invalid request body", &request_id)
    })?;

    let params = req.validate().map_err(|e| {
        warn!(error = %e, "job request rejected");
        ApiError::bad_request(e.to_string(), &request_id)
    })?;

    let Some(provider) = &state.provider else {
        warn!("no job queue in this run mode");
        return Err(ApiError::unavailable(
            "Job ingestion is not available in this run mode",
            &request_id,
        ));
    };

    let job = Job::with_generated_id(params);

    if let Err(e) = provider.push(&job, &state.shutdown).await {
        match e {
            QueueError::Cancelled => warn!(job_id = %job.id(), "shutdown in progress, job not queued"),
            e => error!(job_id = %job.id(), error = %e, "failed to queue job"),
        }
        state
            .telemetry
            .record("job_push_failed", json!({ "request_id": request_id }));
        return Err(ApiError::internal("Failed to create job", &request_id));
    }

    info!(job_id = %job.id(), query = %job.query(), "job created");
    state.telemetry.record(
        "job_created",
        json!({ "job_id": job.id(), "request_id": request_id }),
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateJobResponse::created(job.id(), request_id)),
    ))
}
