//! Serverless function mode
//!
//! Loops on the host's runtime API: take the next invocation, scrape every
//! job it carries and post back a [`FunctionResult`]. Runs until cancelled.

use async_trait::async_trait;
use mapscraper_client::{Invocation, RuntimeClient};
use mapscraper_core::dto::function::{FunctionInvocation, FunctionResult, JobEntries};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::engine::{ScrapeError, Scraper};
use crate::error::RunnerError;
use crate::runner::Runner;

const RUNTIME_ERROR_BACKOFF: Duration = Duration::from_secs(1);

pub struct FunctionRunner {
    runtime: RuntimeClient,
    scraper: Arc<dyn Scraper>,
}

impl FunctionRunner {
    pub fn new(runtime: RuntimeClient, scraper: Arc<dyn Scraper>) -> Self {
        Self { runtime, scraper }
    }

    async fn handle(&self, invocation: Invocation, cancel: &CancellationToken) -> Result<(), RunnerError> {
        let request_id = invocation.request_id;

        let payload: FunctionInvocation = match serde_json::from_str(&invocation.body) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(request_id = %request_id, error = %e, "invalid invocation payload");
                self.runtime
                    .post_error(&request_id, "InvalidPayload", &e.to_string())
                    .await?;
                return Ok(());
            }
        };

        info!(
            request_id = %request_id,
            batch_id = %payload.batch_id,
            part = payload.part,
            jobs = payload.jobs.len(),
            "handling invocation"
        );

        let mut result = FunctionResult {
            batch_id: payload.batch_id,
            part: payload.part,
            ..FunctionResult::default()
        };

        for job in &payload.jobs {
            match self.scraper.scrape(job, cancel).await {
                Ok(entries) => result.results.push(JobEntries {
                    job_id: job.id().to_string(),
                    entries,
                }),
                Err(ScrapeError::Cancelled) => {
                    self.runtime
                        .post_error(&request_id, "Interrupted", "function is shutting down")
                        .await?;
                    return Ok(());
                }
                Err(e) => {
                    warn!(job_id = %job.id(), error = %e, "job failed");
                    result.failed_jobs.push(job.id().to_string());
                }
            }
        }

        self.runtime.post_response(&request_id, &result).await?;
        Ok(())
    }
}

#[async_trait]
impl Runner for FunctionRunner {
    async fn run(&self, cancel: CancellationToken) -> Result<(), RunnerError> {
        info!("waiting for invocations");

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = self.runtime.next_invocation() => next,
            };

            let failure = match next {
                Ok(invocation) => self.handle(invocation, &cancel).await.err(),
                Err(e) => Some(e.into()),
            };

            if let Some(e) = failure {
                error!(error = %e, "runtime API call failed");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(RUNTIME_ERROR_BACKOFF) => {}
                }
            }
        }

        info!("function loop stopped");
        Ok(())
    }

    async fn close(&self) -> Result<(), RunnerError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake::FakeScraper;
    use axum::{
        Json, Router,
        extract::{Path, State},
        http::{HeaderMap, StatusCode},
        routing::{get, post},
    };
    use mapscraper_core::domain::job::{Job, JobParams};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Default)]
    struct Runtime {
        served: Arc<AtomicUsize>,
        responses: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
        errors: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
    }

    fn invocation() -> String {
        let jobs = vec![
            Job::new("j-1", JobParams::new("pizza", "en", 1, false, "", 10).unwrap()),
            Job::new("j-2", JobParams::new("broken", "en", 1, false, "", 10).unwrap()),
        ];
        serde_json::to_string(&FunctionInvocation {
            batch_id: "batch".to_string(),
            part: 3,
            jobs,
        })
        .unwrap()
    }

    async fn next(State(runtime): State<Runtime>) -> (StatusCode, HeaderMap, String) {
        let n = runtime.served.fetch_add(1, Ordering::SeqCst);
        if n >= 2 {
            // Long poll with nothing pending
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        let mut headers = HeaderMap::new();
        headers.insert(
            "lambda-runtime-aws-request-id",
            format!("req-{n}").parse().unwrap(),
        );
        let body = if n == 0 { invocation() } else { "not json".to_string() };
        (StatusCode::OK, headers, body)
    }

    async fn spawn_runtime(runtime: Runtime) -> String {
        let router = Router::new()
            .route("/2018-06-01/runtime/invocation/next", get(next))
            .route(
                "/2018-06-01/runtime/invocation/{id}/response",
                post(
                    |State(rt): State<Runtime>, Path(id): Path<String>, Json(body): Json<serde_json::Value>| async move {
                        rt.responses.lock().unwrap().push((id, body));
                        StatusCode::ACCEPTED
                    },
                ),
            )
            .route(
                "/2018-06-01/runtime/invocation/{id}/error",
                post(
                    |State(rt): State<Runtime>, Path(id): Path<String>, Json(body): Json<serde_json::Value>| async move {
                        rt.errors.lock().unwrap().push((id, body));
                        StatusCode::ACCEPTED
                    },
                ),
            )
            .with_state(runtime);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr.to_string()
    }

    #[tokio::test]
    async fn test_function_answers_invocations_until_cancelled() {
        let runtime = Runtime::default();
        let addr = spawn_runtime(runtime.clone()).await;
        let scraper = Arc::new(FakeScraper {
            failing_query: Some("broken".to_string()),
            ..Default::default()
        });
        let runner = FunctionRunner::new(RuntimeClient::new(addr), scraper);

        let cancel = CancellationToken::new();
        let handle = {
            let cancel = cancel.clone();
            tokio::spawn(async move { runner.run(cancel).await })
        };

        for _ in 0..200 {
            if runtime.served.load(Ordering::SeqCst) >= 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("function loop did not stop")
            .unwrap()
            .unwrap();

        let responses = runtime.responses.lock().unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].0, "req-0");
        let result: FunctionResult = serde_json::from_value(responses[0].1.clone()).unwrap();
        assert_eq!(result.part, 3);
        assert_eq!(result.results.len(), 1);
        assert_eq!(result.results[0].job_id, "j-1");
        assert_eq!(result.failed_jobs, vec!["j-2".to_string()]);

        let errors = runtime.errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, "req-1");
        assert_eq!(errors[0].1["errorType"], "InvalidPayload");
    }
}
