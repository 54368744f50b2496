//! Dashboard JSON export
//!
//! Dumps every results row as a JSON array of header → value objects, minus
//! the configured sensitive columns.

use crate::db::results::get_all_results;
use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::path::Path;

/// Write the dashboard file; returns the number of exported rows
pub async fn export_dashboard(pool: &SqlitePool, strip_columns: &[String], out_path: &Path) -> Result<usize> {
    let rows = get_all_results(pool).await.context("Failed to read results")?;
    let rows = strip(rows, strip_columns);

    if let Some(parent) = out_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let json = serde_json::to_string_pretty(&rows)?;
    tokio::fs::write(out_path, json)
        .await
        .with_context(|| format!("Failed to write {}", out_path.display()))?;

    tracing::info!("Exported {} records to {}", rows.len(), out_path.display());
    Ok(rows.len())
}

fn strip(rows: Vec<BTreeMap<String, String>>, columns: &[String]) -> Vec<BTreeMap<String, String>> {
    if columns.is_empty() {
        return rows;
    }
    rows.into_iter()
        .map(|mut row| {
            for column in columns {
                row.remove(column);
            }
            row
        })
        .collect()
}
