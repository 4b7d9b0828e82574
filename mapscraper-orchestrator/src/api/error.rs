//! API Error Handling
//!
//! Every failed request is answered with the ingestion error body
//! `{status: "error", message, request_id}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use mapscraper_core::dto::job::CreateJobResponse;

/// API error tagged with the request's correlation id
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    request_id: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            request_id: request_id.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>, request_id: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, request_id)
    }

    pub fn method_not_allowed(request_id: &str) -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed", request_id)
    }

    pub fn internal(message: impl Into<String>, request_id: &str) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message, request_id)
    }

    pub fn unavailable(message: impl Into<String>, request_id: &str) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message, request_id)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = CreateJobResponse::error(self.message, self.request_id);
        (self.status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
