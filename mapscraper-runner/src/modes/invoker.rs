//! Serverless invoker mode
//!
//! Splits the input file into chunks and invokes the deployed function once
//! per chunk, sequentially. Entries returned by the function are appended to
//! the results file. Failed invocations are counted and reported at the end.

use async_trait::async_trait;
use mapscraper_client::FunctionClient;
use mapscraper_core::dto::function::FunctionInvocation;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::JobTemplate;
use crate::error::RunnerError;
use crate::input::read_jobs;
use crate::repository::{JsonlResultWriter, ResultWriter};
use crate::runner::Runner;

pub struct InvokerRunner {
    function: FunctionClient,
    input: PathBuf,
    template: JobTemplate,
    chunk_size: usize,
    writer: JsonlResultWriter,
}

impl InvokerRunner {
    pub fn new(
        function: FunctionClient,
        input: PathBuf,
        results: PathBuf,
        template: JobTemplate,
        chunk_size: usize,
    ) -> Self {
        Self {
            function,
            input,
            template,
            chunk_size: chunk_size.max(1),
            writer: JsonlResultWriter::new(results),
        }
    }
}

#[async_trait]
impl Runner for InvokerRunner {
    async fn run(&self, cancel: CancellationToken) -> Result<(), RunnerError> {
        let jobs = read_jobs(&self.input, &self.template).await?;
        let batch_id = Uuid::new_v4().to_string();
        let parts = jobs.len().div_ceil(self.chunk_size);

        info!(
            batch_id = %batch_id,
            function = %self.function.url(),
            jobs = jobs.len(),
            parts,
            "invoking function"
        );

        let mut failed_parts = 0;
        let mut failed_jobs = 0;

        for (part, chunk) in jobs.chunks(self.chunk_size).enumerate() {
            let invocation = FunctionInvocation {
                batch_id: batch_id.clone(),
                part,
                jobs: chunk.to_vec(),
            };

            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    warn!(batch_id = %batch_id, part, parts, "invoker interrupted");
                    return Err(RunnerError::Cancelled);
                }
                outcome = self.function.invoke(&invocation) => outcome,
            };

            let result = match outcome {
                Ok(result) => result,
                Err(e) => {
                    error!(batch_id = %batch_id, part, error = %e, "invocation failed");
                    failed_parts += 1;
                    continue;
                }
            };

            for job_entries in &result.results {
                match chunk.iter().find(|job| job.id() == job_entries.job_id) {
                    Some(job) => self.writer.write(job, &job_entries.entries).await?,
                    None => warn!(job_id = %job_entries.job_id, "function returned an unknown job"),
                }
            }
            failed_jobs += result.failed_jobs.len();
            info!(batch_id = %batch_id, part, results = result.results.len(), "part done");
        }

        if failed_parts > 0 {
            return Err(RunnerError::Partial(format!(
                "{} of {} invocations failed",
                failed_parts, parts
            )));
        }

        info!(batch_id = %batch_id, parts, failed_jobs, "batch finished");
        Ok(())
    }

    async fn close(&self) -> Result<(), RunnerError> {
        self.writer.flush().await
    }
}
