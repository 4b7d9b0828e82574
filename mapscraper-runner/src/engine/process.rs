//! External engine process

use async_trait::async_trait;
use mapscraper_core::domain::job::Job;
use serde_json::Value;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{ScrapeError, Scraper};

/// Engine executable and its argument lists
#[derive(Debug, Clone)]
pub struct EngineCommand {
    pub program: String,
    /// Arguments for a scrape run
    pub args: Vec<String>,
    /// Arguments for the dependency install run
    pub install_args: Vec<String>,
}

impl EngineCommand {
    /// Splits a whitespace-separated command line into program and arguments
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            install_args: vec!["install".to_string()],
        })
    }
}

/// Runs one engine process per job
#[derive(Debug, Clone)]
pub struct ProcessScraper {
    command: EngineCommand,
}

impl ProcessScraper {
    pub fn new(command: EngineCommand) -> Self {
        Self { command }
    }

    fn base_command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.command.program);
        cmd.args(args)
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        cmd
    }
}

async fn read_entries(child: &mut Child) -> Result<(Vec<Value>, ExitStatus), ScrapeError> {
    let mut entries = Vec::new();

    if let Some(stdout) = child.stdout.take() {
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }
    }

    let status = child.wait().await?;
    Ok((entries, status))
}

#[async_trait]
impl Scraper for ProcessScraper {
    async fn scrape(&self, job: &Job, cancel: &CancellationToken) -> Result<Vec<Value>, ScrapeError> {
        let mut child = self
            .base_command(&self.command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(ScrapeError::Spawn)?;

        debug!(job_id = %job.id(), pid = ?child.id(), "engine started");

        if let Some(mut stdin) = child.stdin.take() {
            let mut payload = serde_json::to_vec(job)?;
            payload.push(b'\n');
            stdin.write_all(&payload).await?;
        }

        // Dropping the child on cancellation kills the process.
        let (entries, status) = tokio::select! {
            _ = cancel.cancelled() => return Err(ScrapeError::Cancelled),
            result = read_entries(&mut child) => result?,
        };

        if !status.success() {
            return Err(ScrapeError::Failed(status));
        }

        debug!(job_id = %job.id(), entries = entries.len(), "engine finished");
        Ok(entries)
    }

    async fn install(&self, cancel: &CancellationToken) -> Result<(), ScrapeError> {
        info!(program = %self.command.program, "installing engine dependencies");

        let mut child = self
            .base_command(&self.command.install_args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .spawn()
            .map_err(ScrapeError::Spawn)?;

        let status = tokio::select! {
            _ = cancel.cancelled() => return Err(ScrapeError::Cancelled),
            status = child.wait() => status?,
        };

        if !status.success() {
            return Err(ScrapeError::Failed(status));
        }

        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use mapscraper_core::domain::job::JobParams;
    use std::time::{Duration, Instant};

    fn shell(script: &str) -> ProcessScraper {
        ProcessScraper::new(EngineCommand {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            install_args: vec!["-c".to_string(), script.to_string()],
        })
    }

    fn job() -> Job {
        Job::new("job-1", JobParams::new("pizza", "en", 1, false, "", 10).unwrap())
    }

    #[test]
    fn test_parse_command_line() {
        let cmd = EngineCommand::parse("gmaps-engine --headless  -v").unwrap();
        assert_eq!(cmd.program, "gmaps-engine");
        assert_eq!(cmd.args, vec!["--headless", "-v"]);
        assert_eq!(cmd.install_args, vec!["install"]);
        assert!(EngineCommand::parse("   ").is_none());
    }

    #[tokio::test]
    async fn test_collects_entries_from_stdout() {
        let scraper = shell(r#"read job; echo '{"n":1}'; echo; echo '{"n":2}'"#);
        let entries = scraper
            .scrape(&job(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(entries, vec![serde_json::json!({"n":1}), serde_json::json!({"n":2})]);
    }

    #[tokio::test]
    async fn test_engine_receives_job_on_stdin() {
        let scraper = shell(r#"read job; echo "$job""#);
        let entries = scraper
            .scrape(&job(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(entries[0]["id"], "job-1");
        assert_eq!(entries[0]["query"], "pizza");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_an_error() {
        let scraper = shell("read job; exit 3");
        let err = scraper
            .scrape(&job(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::Failed(status) if status.code() == Some(3)));
    }

    #[tokio::test]
    async fn test_cancel_stops_long_scrape() {
        let scraper = shell("sleep 30");
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = scraper.scrape(&job(), &cancel).await.unwrap_err();
        assert!(matches!(err, ScrapeError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_install_reports_failure() {
        assert!(shell("exit 0").install(&CancellationToken::new()).await.is_ok());
        assert!(shell("exit 1").install(&CancellationToken::new()).await.is_err());
    }
}
