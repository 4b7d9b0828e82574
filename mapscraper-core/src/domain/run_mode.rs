//! Run mode selector

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Execution backend active for the process.
///
/// Exactly one run mode is selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// Single batch pass over an input file
    File,
    /// Consume jobs from the database queue
    Database,
    /// Seed the database queue from an input file
    DatabaseProduce,
    /// Install the scraping engine's dependencies
    InstallDependency,
    /// Long-running service draining the ingestion queue
    WebService,
    /// Serverless function answering invocations
    ServerlessFunction,
    /// Fan an input file out to a serverless function
    ServerlessInvoker,
}

impl RunMode {
    pub const ALL: [RunMode; 7] = [
        RunMode::File,
        RunMode::Database,
        RunMode::DatabaseProduce,
        RunMode::InstallDependency,
        RunMode::WebService,
        RunMode::ServerlessFunction,
        RunMode::ServerlessInvoker,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::File => "file",
            RunMode::Database => "database",
            RunMode::DatabaseProduce => "database-produce",
            RunMode::InstallDependency => "install-dependency",
            RunMode::WebService => "web-service",
            RunMode::ServerlessFunction => "serverless-function",
            RunMode::ServerlessInvoker => "serverless-invoker",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Selector that names no run mode
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown run mode: {0:?}")]
pub struct UnknownRunMode(pub String);

impl FromStr for RunMode {
    type Err = UnknownRunMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RunMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| UnknownRunMode(s.to_string()))
    }
}
