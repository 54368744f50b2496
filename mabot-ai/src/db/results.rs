//! Results view and local warehouse tables
//!
//! Both sinks upsert keyed by file id, so a duplicate write after a crash
//! between persist and the ledger commit replaces the earlier row.

use super::classify_db_error;
use crate::error::RemoteError;
use crate::models::{AnalysisRecord, RESULT_HEADERS};
use crate::types::{SpreadsheetSink, WarehouseSink};
use sqlx::SqlitePool;
use std::collections::BTreeMap;

/// Human-facing results view stored in the `results` table
#[derive(Clone)]
pub struct SqliteResultsSheet {
    pool: SqlitePool,
}

impl SqliteResultsSheet {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SpreadsheetSink for SqliteResultsSheet {
    async fn write_row(&self, record: &AnalysisRecord) -> Result<(), RemoteError> {
        let row: BTreeMap<&str, String> = RESULT_HEADERS
            .iter()
            .copied()
            .zip(record.to_sheet_row())
            .collect();
        let row_json = serde_json::to_string(&row)
            .map_err(|e| RemoteError::non_retryable(format!("encode result row: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO results (file_id, file_name, row_json, written_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(file_id) DO UPDATE SET
                file_name = excluded.file_name,
                row_json = excluded.row_json,
                written_at = excluded.written_at
            "#,
        )
        .bind(&record.file_id)
        .bind(&record.file_name)
        .bind(row_json)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(classify_db_error)?;

        tracing::debug!(file_id = %record.file_id, "Result row written");
        Ok(())
    }
}

/// Warehouse sink used when no remote warehouse is configured
#[derive(Clone)]
pub struct LocalWarehouse {
    pool: SqlitePool,
}

impl LocalWarehouse {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl WarehouseSink for LocalWarehouse {
    async fn insert_row(&self, record: &AnalysisRecord) -> Result<(), RemoteError> {
        let row_json = serde_json::to_string(&record.to_warehouse_row())
            .map_err(|e| RemoteError::non_retryable(format!("encode warehouse row: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO warehouse_rows (file_id, row_json, inserted_at)
            VALUES (?, ?, ?)
            ON CONFLICT(file_id) DO UPDATE SET
                row_json = excluded.row_json,
                inserted_at = excluded.inserted_at
            "#,
        )
        .bind(&record.file_id)
        .bind(row_json)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(classify_db_error)?;

        tracing::debug!(file_id = %record.file_id, "Warehouse row inserted locally");
        Ok(())
    }
}

/// Every result row as a header → value map, oldest write first
pub async fn get_all_results(pool: &SqlitePool) -> anyhow::Result<Vec<BTreeMap<String, String>>> {
    let rows: Vec<String> = sqlx::query_scalar("SELECT row_json FROM results ORDER BY written_at, file_id")
        .fetch_all(pool)
        .await?;

    let mut results = Vec::with_capacity(rows.len());
    for row_json in rows {
        results.push(serde_json::from_str(&row_json)?);
    }
    Ok(results)
}

/// Warehouse rows written to the local table, keyed by file id
pub async fn get_warehouse_rows(pool: &SqlitePool) -> anyhow::Result<BTreeMap<String, BTreeMap<String, String>>> {
    let rows: Vec<(String, String)> = sqlx::query_as("SELECT file_id, row_json FROM warehouse_rows")
        .fetch_all(pool)
        .await?;

    let mut out = BTreeMap::new();
    for (file_id, row_json) in rows {
        out.insert(file_id, serde_json::from_str(&row_json)?);
    }
    Ok(out)
}
