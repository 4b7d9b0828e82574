//! Result writers
//!
//! Destinations for the entries a scrape produced:
//! - [`JsonlResultWriter`]: one JSON line per entry in a single file
//! - [`JobFileResultWriter`]: one JSON-lines file per job in a directory
//! - [`PostgresResultWriter`]: rows in the `results` table

use async_trait::async_trait;
use mapscraper_core::domain::job::Job;
use serde_json::Value;
use sqlx::PgPool;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;

use crate::error::RunnerError;

/// Sink for scraped entries
#[async_trait]
pub trait ResultWriter: Send + Sync {
    /// Stores every entry scraped for `job`
    async fn write(&self, job: &Job, entries: &[Value]) -> Result<(), RunnerError>;

    /// Flushes buffered output; safe to call more than once
    async fn flush(&self) -> Result<(), RunnerError> {
        Ok(())
    }
}

fn line_for(job: &Job, entry: &Value) -> Result<Vec<u8>, RunnerError> {
    let mut line = serde_json::to_vec(&serde_json::json!({
        "job_id": job.id(),
        "query": job.query(),
        "data": entry,
    }))?;
    line.push(b'\n');
    Ok(line)
}

// =============================================================================
// JSON Lines File
// =============================================================================

/// Appends entries to a single JSON-lines file, opened on first write
pub struct JsonlResultWriter {
    path: PathBuf,
    file: Mutex<Option<BufWriter<File>>>,
}

impl JsonlResultWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ResultWriter for JsonlResultWriter {
    async fn write(&self, job: &Job, entries: &[Value]) -> Result<(), RunnerError> {
        let mut guard = self.file.lock().await;

        if guard.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            *guard = Some(BufWriter::new(file));
        }

        if let Some(writer) = guard.as_mut() {
            for entry in entries {
                writer.write_all(&line_for(job, entry)?).await?;
            }
        }

        Ok(())
    }

    async fn flush(&self) -> Result<(), RunnerError> {
        if let Some(mut writer) = self.file.lock().await.take() {
            writer.flush().await?;
        }
        Ok(())
    }
}

// =============================================================================
// File Per Job
// =============================================================================

/// Writes `<dir>/<job_id>.jsonl` for every job
pub struct JobFileResultWriter {
    dir: PathBuf,
}

impl JobFileResultWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Output path for a job; the id is reduced to a safe file name
    pub fn path_for(&self, job_id: &str) -> PathBuf {
        let name: String = job_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.jsonl", name))
    }
}

#[async_trait]
impl ResultWriter for JobFileResultWriter {
    async fn write(&self, job: &Job, entries: &[Value]) -> Result<(), RunnerError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let mut buf = Vec::new();
        for entry in entries {
            buf.extend(line_for(job, entry)?);
        }

        tokio::fs::write(self.path_for(job.id()), buf).await?;
        Ok(())
    }
}

// =============================================================================
// Postgres
// =============================================================================

/// Inserts entries into the `results` table, one transaction per job
pub struct PostgresResultWriter {
    pool: PgPool,
}

impl PostgresResultWriter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultWriter for PostgresResultWriter {
    async fn write(&self, job: &Job, entries: &[Value]) -> Result<(), RunnerError> {
        let mut tx = self.pool.begin().await?;

        for entry in entries {
            sqlx::query("INSERT INTO results (job_id, data) VALUES ($1, $2)")
                .bind(job.id())
                .bind(entry)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
