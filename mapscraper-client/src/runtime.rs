//! Serverless runtime API
//!
//! The function side of the serverless contract: long-poll the runtime for
//! the next invocation, then post either a response or an error for it.

use reqwest::Client;
use serde::Serialize;

use crate::error::{ClientError, Result};
use crate::{handle_empty_response, trim_base_url};

const API_VERSION: &str = "2018-06-01";
const REQUEST_ID_HEADER: &str = "lambda-runtime-aws-request-id";

/// One pending invocation handed out by the runtime
#[derive(Debug, Clone)]
pub struct Invocation {
    pub request_id: String,
    pub body: String,
}

/// Client for the runtime API of the serverless host
#[derive(Debug, Clone)]
pub struct RuntimeClient {
    base_url: String,
    client: Client,
}

impl RuntimeClient {
    /// # Arguments
    /// * `runtime_api` - Host and port of the runtime API (e.g. "127.0.0.1:9001"),
    ///   with or without scheme
    pub fn new(runtime_api: impl Into<String>) -> Self {
        let api = trim_base_url(runtime_api.into());
        let base = if api.starts_with("http://") || api.starts_with("https://") {
            api
        } else {
            format!("http://{}", api)
        };

        Self {
            base_url: format!("{}/{}/runtime", base, API_VERSION),
            client: Client::new(),
        }
    }

    /// Blocks until the runtime hands out the next invocation
    pub async fn next_invocation(&self) -> Result<Invocation> {
        let url = format!("{}/invocation/next", self.base_url);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        let request_id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or(ClientError::MissingHeader(REQUEST_ID_HEADER))?;

        let body = response.text().await?;

        Ok(Invocation { request_id, body })
    }

    /// Reports a successful result for an invocation
    pub async fn post_response<T: Serialize>(&self, request_id: &str, body: &T) -> Result<()> {
        let url = format!("{}/invocation/{}/response", self.base_url, request_id);
        let response = self.client.post(&url).json(body).send().await?;

        handle_empty_response(response).await
    }

    /// Reports a failed invocation
    pub async fn post_error(&self, request_id: &str, error_type: &str, message: &str) -> Result<()> {
        let url = format!("{}/invocation/{}/error", self.base_url, request_id);
        let body = serde_json::json!({
            "errorType": error_type,
            "errorMessage": message,
        });
        let response = self.client.post(&url).json(&body).send().await?;

        handle_empty_response(response).await
    }
}
