//! Job ingestion endpoint

use mapscraper_core::dto::job::{CreateJobRequest, CreateJobResponse};

use crate::error::{ClientError, Result};
use crate::{ApiClient, handle_response};

impl ApiClient {
    /// Submit a new scrape job
    ///
    /// # Arguments
    /// * `req` - The job creation request
    ///
    /// # Returns
    /// The created response carrying `job_id` and `request_id`.
    /// Rejections come back as [`ClientError::ApiError`] with the server's message.
    pub async fn create_job(&self, req: &CreateJobRequest) -> Result<CreateJobResponse> {
        let url = format!("{}/api/jobs", self.base_url);
        let response = self.client.post(&url).json(req).send().await?;

        handle_response::<CreateJobResponse>(response)
            .await
            .map_err(|e| match e {
                ClientError::ApiError { status, message } => {
                    let message = serde_json::from_str::<CreateJobResponse>(&message)
                        .ok()
                        .and_then(|body| body.message)
                        .unwrap_or(message);
                    ClientError::ApiError { status, message }
                }
                other => other,
            })
    }
}
