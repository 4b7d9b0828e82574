//! Serverless function invocation

use mapscraper_core::dto::function::{FunctionInvocation, FunctionResult};
use reqwest::Client;

use crate::error::Result;
use crate::{handle_response, trim_base_url};

/// Client invoking a deployed serverless function through its HTTP URL
#[derive(Debug, Clone)]
pub struct FunctionClient {
    url: String,
    client: Client,
}

impl FunctionClient {
    /// # Arguments
    /// * `url` - The function's invocation URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: trim_base_url(url.into()),
            client: Client::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Invoke the function synchronously with one chunk of jobs
    pub async fn invoke(&self, invocation: &FunctionInvocation) -> Result<FunctionResult> {
        tracing::debug!(
            batch_id = %invocation.batch_id,
            part = invocation.part,
            jobs = invocation.jobs.len(),
            "invoking function"
        );

        let response = self.client.post(&self.url).json(invocation).send().await?;

        handle_response(response).await
    }
}
