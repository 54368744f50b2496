//! Streaming-insert warehouse client
//!
//! Posts one row per call to `<endpoint>/<table>/insertAll` with the file id as
//! `insertId`, so a retried or duplicated insert is de-duplicated downstream.

use crate::error::RemoteError;
use crate::models::AnalysisRecord;
use crate::types::WarehouseSink;
use anyhow::{Context, Result};
use mabot_common::config::WarehouseConfig;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllResponse {
    #[serde(default)]
    insert_errors: Vec<Value>,
}

pub struct WarehouseClient {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl WarehouseClient {
    pub fn new(config: &WarehouseConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        let token = std::env::var(&config.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty());
        if token.is_none() {
            tracing::warn!("{} not set, warehouse requests are unauthenticated", config.token_env);
        }

        Ok(Self {
            client,
            url: insert_url(config),
            token,
        })
    }
}

fn insert_url(config: &WarehouseConfig) -> String {
    format!(
        "{}/{}/insertAll",
        config.endpoint.trim_end_matches('/'),
        config.table.trim_matches('/')
    )
}

fn insert_body(record: &AnalysisRecord) -> Value {
    json!({
        "rows": [{
            "insertId": record.file_id,
            "json": record.to_warehouse_row(),
        }]
    })
}

#[async_trait::async_trait]
impl WarehouseSink for WarehouseClient {
    async fn insert_row(&self, record: &AnalysisRecord) -> Result<(), RemoteError> {
        let mut request = self.client.post(&self.url).json(&insert_body(record));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(RemoteError::from_status(status.as_u16(), &text));
        }

        // An empty 200 body counts as accepted
        if !text.trim().is_empty() {
            let parsed: InsertAllResponse = serde_json::from_str(&text)
                .map_err(|e| RemoteError::non_retryable(format!("malformed insertAll response: {}", e)))?;
            if !parsed.insert_errors.is_empty() {
                return Err(RemoteError::non_retryable(format!(
                    "row rejected: {}",
                    Value::Array(parsed.insert_errors)
                )));
            }
        }

        debug!(file_id = %record.file_id, "Warehouse row inserted");
        Ok(())
    }
}
