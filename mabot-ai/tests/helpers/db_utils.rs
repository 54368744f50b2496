//! Database Test Utilities

use anyhow::Result;
use sqlx::SqlitePool;
use tempfile::TempDir;

/// Create a temporary database with the mabot-ai tables
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> Result<(TempDir, SqlitePool)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test_mabot.db");
    let pool = mabot_ai::db::init_database_pool(&db_path).await?;
    Ok((temp_dir, pool))
}

/// Column names of a table, in declaration order
pub async fn get_table_columns(pool: &SqlitePool, table_name: &str) -> Result<Vec<String>> {
    let query = format!("SELECT name FROM pragma_table_info('{}')", table_name);
    let columns = sqlx::query_scalar::<_, String>(&query).fetch_all(pool).await?;
    Ok(columns)
}
