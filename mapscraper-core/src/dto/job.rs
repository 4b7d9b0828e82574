//! Job ingestion DTOs

use serde::{Deserialize, Serialize};

use crate::domain::job::{JobParams, ValidationError};

/// Status token returned with a successfully queued job
pub const STATUS_CREATED: &str = "created";

/// Status token returned with every error response
pub const STATUS_ERROR: &str = "error";

/// Request body of `POST /api/jobs`
///
/// Missing fields take their zero value, so that validation reports them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateJobRequest {
    pub query: String,
    pub language: String,
    pub max_depth: i64,
    pub extract_email: bool,
    pub geo_coordinates: String,
    pub zoom: i64,
}

impl CreateJobRequest {
    /// Checks every ingestion rule and returns the validated parameters
    pub fn validate(&self) -> Result<JobParams, ValidationError> {
        JobParams::new(
            self.query.clone(),
            self.language.clone(),
            self.max_depth,
            self.extract_email,
            self.geo_coordinates.clone(),
            self.zoom,
        )
    }
}

/// Response body of `POST /api/jobs`
///
/// `job_id` is only present when the job was queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateJobResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub request_id: String,
}

impl CreateJobResponse {
    pub fn created(job_id: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            job_id: Some(job_id.into()),
            status: STATUS_CREATED.to_string(),
            message: Some("Job created successfully".to_string()),
            request_id: request_id.into(),
        }
    }

    pub fn error(message: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            job_id: None,
            status: STATUS_ERROR.to_string(),
            message: Some(message.into()),
            request_id: request_id.into(),
        }
    }
}
