//! SQLite ledger
//!
//! One row per file id. A Success row is final; a Quarantined row is
//! superseded by the next terminal outcome for the same file.

use crate::error::LedgerError;
use crate::models::{LedgerEntry, LedgerStatus};
use crate::types::Ledger;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;

/// Ledger backed by the `ledger` table
#[derive(Clone)]
pub struct SqliteLedger {
    pool: SqlitePool,
}

impl SqliteLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Delete the entry for a file so that it is reprocessed on a later run
    ///
    /// Returns false when no entry existed.
    pub async fn clear(&self, file_id: &str) -> Result<bool, LedgerError> {
        let result = sqlx::query("DELETE FROM ledger WHERE file_id = ?")
            .bind(file_id)
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected() > 0;
        if removed {
            tracing::info!(file_id = %file_id, "Ledger entry cleared");
        }
        Ok(removed)
    }

    /// All entries, most recent first
    pub async fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let rows = sqlx::query(
            r#"
            SELECT file_id, file_name, status, error, origin, attempt_count, recorded_at
            FROM ledger
            ORDER BY recorded_at DESC, file_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }
}

fn entry_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<LedgerEntry, LedgerError> {
    let status_str: String = row.get("status");
    let status = LedgerStatus::parse(&status_str)
        .ok_or_else(|| LedgerError::Store(format!("unknown ledger status '{}'", status_str)))?;

    let recorded_str: String = row.get("recorded_at");
    let recorded_at = DateTime::parse_from_rfc3339(&recorded_str)
        .map_err(|e| LedgerError::Store(format!("bad recorded_at '{}': {}", recorded_str, e)))?
        .with_timezone(&Utc);

    let attempt_count: i64 = row.get("attempt_count");

    Ok(LedgerEntry {
        file_id: row.get("file_id"),
        file_name: row.get("file_name"),
        status,
        error: row.get("error"),
        origin: row.get("origin"),
        attempt_count: attempt_count.max(0) as u32,
        recorded_at,
    })
}

#[async_trait::async_trait]
impl Ledger for SqliteLedger {
    async fn is_processed(&self, file_id: &str) -> Result<bool, LedgerError> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM ledger WHERE file_id = ? AND status = 'success'")
                .bind(file_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    async fn processed_ids(&self) -> Result<HashSet<String>, LedgerError> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT file_id FROM ledger WHERE status = 'success'")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().collect())
    }

    async fn record(&self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        // Upsert that refuses to touch a success row
        let result = sqlx::query(
            r#"
            INSERT INTO ledger (file_id, file_name, status, error, origin, attempt_count, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(file_id) DO UPDATE SET
                file_name = excluded.file_name,
                status = excluded.status,
                error = excluded.error,
                origin = COALESCE(excluded.origin, ledger.origin),
                attempt_count = ledger.attempt_count + 1,
                recorded_at = excluded.recorded_at
            WHERE ledger.status != 'success'
            "#,
        )
        .bind(&entry.file_id)
        .bind(&entry.file_name)
        .bind(entry.status.as_str())
        .bind(&entry.error)
        .bind(&entry.origin)
        .bind(entry.attempt_count.max(1) as i64)
        .bind(entry.recorded_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::AlreadyProcessed(entry.file_id.clone()));
        }

        tracing::debug!(
            file_id = %entry.file_id,
            status = %entry.status,
            "Ledger entry recorded"
        );
        Ok(())
    }

    async fn entry(&self, file_id: &str) -> Result<Option<LedgerEntry>, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT file_id, file_name, status, error, origin, attempt_count, recorded_at
            FROM ledger
            WHERE file_id = ?
            "#,
        )
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(entry_from_row).transpose()
    }
}
