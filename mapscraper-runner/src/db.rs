//! Postgres connection pool and schema

use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

/// Builds a pool without connecting; the first query opens a connection.
pub fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect_lazy(database_url)
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Job queue
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS gmaps_jobs (
            id TEXT PRIMARY KEY,
            priority INTEGER NOT NULL DEFAULT 0,
            payload JSONB NOT NULL,
            status VARCHAR(20) NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_gmaps_jobs_claim ON gmaps_jobs(status, priority, created_at)",
    )
    .execute(pool)
    .await?;

    // Scraped entries
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS results (
            id BIGSERIAL PRIMARY KEY,
            job_id TEXT NOT NULL,
            data JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_results_job_id ON results(job_id)")
        .execute(pool)
        .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
