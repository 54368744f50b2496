//! Database access for mabot-ai
//!
//! One SQLite file holds the ledger, the human-facing results view and (when no
//! remote warehouse is configured) the local warehouse table.

pub mod ledger;
pub mod results;

use crate::error::RemoteError;
use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
///
/// Creates the parent directory and the database file when missing.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create the ledger, results and warehouse_rows tables if they don't exist
async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ledger (
            file_id TEXT PRIMARY KEY,
            file_name TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('success', 'quarantined')),
            error TEXT,
            origin TEXT,
            attempt_count INTEGER NOT NULL DEFAULT 1,
            recorded_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS results (
            file_id TEXT PRIMARY KEY,
            file_name TEXT NOT NULL,
            row_json TEXT NOT NULL,
            written_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS warehouse_rows (
            file_id TEXT PRIMARY KEY,
            row_json TEXT NOT NULL,
            inserted_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (ledger, results, warehouse_rows)");

    Ok(())
}

/// Classify a SQLite failure for a sink write
///
/// Lock contention is transient; everything else is permanent.
pub(crate) fn classify_db_error(err: sqlx::Error) -> RemoteError {
    let msg = err.to_string();
    let lower = msg.to_lowercase();
    if lower.contains("database is locked") || lower.contains("busy") {
        return RemoteError::retryable(format!("database busy: {}", msg));
    }
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => RemoteError::retryable(msg),
        _ => RemoteError::non_retryable(msg),
    }
}
