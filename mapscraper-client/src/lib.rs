//! Mapscraper HTTP Clients
//!
//! Type-safe reqwest clients for the remote endpoints the system talks to:
//! - [`ApiClient`]: the job ingestion API (`POST /api/jobs`)
//! - [`FunctionClient`]: a deployed serverless function, used by the invoker
//! - [`RuntimeClient`]: the serverless runtime API, used inside the function
//!
//! # Example
//!
//! ```no_run
//! use mapscraper_client::ApiClient;
//! use mapscraper_core::dto::job::CreateJobRequest;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ApiClient::new("http://localhost:6060");
//!
//!     let created = client.create_job(&CreateJobRequest {
//!         query: "coffee shops".to_string(),
//!         language: "en".to_string(),
//!         max_depth: 3,
//!         zoom: 15,
//!         ..Default::default()
//!     }).await?;
//!
//!     println!("Queued job: {:?}", created.job_id);
//!     Ok(())
//! }
//! ```

pub mod error;
mod function;
mod jobs;
mod runtime;

pub use error::{ClientError, Result};
pub use function::FunctionClient;
pub use runtime::{Invocation, RuntimeClient};

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the job ingestion API
#[derive(Debug, Clone)]
pub struct ApiClient {
    /// Base URL of the API (e.g., "http://localhost:6060")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl ApiClient {
    /// Create a new API client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the ingestion API (e.g., "http://localhost:6060")
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: trim_base_url(base_url.into()),
            client: Client::new(),
        }
    }

    /// Get the base URL of the API
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

// =============================================================================
// Response Handlers
// =============================================================================

pub(crate) fn trim_base_url(base_url: String) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Handle a response and deserialize JSON
///
/// Non-success statuses become [`ClientError::ApiError`] carrying the body text.
pub(crate) async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();

    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(ClientError::api_error(status.as_u16(), error_text));
    }

    response
        .json()
        .await
        .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
}

/// Handle a response whose body is ignored
pub(crate) async fn handle_empty_response(response: reqwest::Response) -> Result<()> {
    let status = response.status();

    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(ClientError::api_error(status.as_u16(), error_text));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = ApiClient::new("http://localhost:6060");
        assert_eq!(client.base_url(), "http://localhost:6060");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = ApiClient::new("http://localhost:6060/");
        assert_eq!(client.base_url(), "http://localhost:6060");
    }
}
