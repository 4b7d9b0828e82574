//! Serverless function DTOs

use serde::{Deserialize, Serialize};

use crate::domain::job::Job;

/// Payload sent by the invoker to the serverless function
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionInvocation {
    /// Identifier shared by every chunk of one invoker run
    pub batch_id: String,
    /// Zero-based index of this chunk within the batch
    pub part: usize,
    pub jobs: Vec<Job>,
}

/// Response returned by the serverless function for one invocation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionResult {
    pub batch_id: String,
    pub part: usize,
    /// Entries scraped per job, for the jobs that succeeded
    pub results: Vec<JobEntries>,
    /// Ids of jobs that failed inside the function
    #[serde(default)]
    pub failed_jobs: Vec<String>,
}

/// Entries scraped for one job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEntries {
    pub job_id: String,
    pub entries: Vec<serde_json::Value>,
}
