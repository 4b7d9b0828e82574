//! Runner configuration
//!
//! Settings shared by the runner variants. Each run mode reads only the
//! fields it needs; [`RunnerConfig::require_input`] and friends turn a missing
//! setting into a configuration error at construction time.

use mapscraper_core::domain::job::{JobParams, ValidationError};
use std::path::PathBuf;

use crate::error::RunnerError;

/// Job parameters applied to every query read from an input file
#[derive(Debug, Clone)]
pub struct JobTemplate {
    pub language: String,
    pub max_depth: i64,
    pub extract_email: bool,
    pub geo_coordinates: String,
    pub zoom: i64,
}

impl JobTemplate {
    /// Builds validated parameters for one query
    pub fn params_for(&self, query: &str) -> Result<JobParams, ValidationError> {
        JobParams::new(
            query,
            self.language.clone(),
            self.max_depth,
            self.extract_email,
            self.geo_coordinates.clone(),
            self.zoom,
        )
    }
}

impl Default for JobTemplate {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            max_depth: 10,
            extract_email: false,
            geo_coordinates: String::new(),
            zoom: 15,
        }
    }
}

/// Runner configuration
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Query file for batch, producer and invoker modes
    pub input_file: Option<PathBuf>,

    /// JSON-lines output of batch and invoker modes
    pub results_file: PathBuf,

    /// Directory receiving one result file per job in web-service mode
    pub data_folder: PathBuf,

    /// Number of jobs processed at once
    pub concurrency: usize,

    /// Defaults for jobs built from input files
    pub template: JobTemplate,

    /// Invocation URL of the deployed serverless function
    pub function_url: Option<String>,

    /// Runtime API address inside the serverless host
    pub runtime_api: Option<String>,

    /// Queries per serverless invocation
    pub chunk_size: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2);

        Self {
            input_file: None,
            results_file: PathBuf::from("results.jsonl"),
            data_folder: PathBuf::from("webdata"),
            concurrency: (cpus / 2).max(1),
            template: JobTemplate::default(),
            function_url: None,
            runtime_api: None,
            chunk_size: 10,
        }
    }
}

impl RunnerConfig {
    pub fn require_input(&self) -> Result<PathBuf, RunnerError> {
        self.input_file
            .clone()
            .ok_or(RunnerError::MissingConfig("input file"))
    }

    pub fn require_function_url(&self) -> Result<String, RunnerError> {
        self.function_url
            .clone()
            .ok_or(RunnerError::MissingConfig("function url"))
    }

    pub fn require_runtime_api(&self) -> Result<String, RunnerError> {
        self.runtime_api
            .clone()
            .ok_or(RunnerError::MissingConfig("runtime api address"))
    }
}
