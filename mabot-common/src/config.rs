//! Configuration loading and path resolution
//!
//! The whole bot is driven by one immutable [`AppConfig`] value, loaded once at
//! startup from a TOML file and handed to the run coordinator. Nothing reads
//! configuration from ambient global state after that point.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "MABOT_CONFIG";

/// Environment variable carrying the model API key (overrides TOML)
pub const API_KEY_ENV_VAR: &str = "GEMINI_API_KEY";

/// Prompt used when neither `llm.prompt` nor `llm.prompt_file` is configured
pub const DEFAULT_ANALYSIS_PROMPT: &str = "\
Act as an expert business analyst for sales meetings.
Analyze the transcript provided.
Strictly return ONLY a single valid JSON object, with no surrounding text or markdown.
If a piece of information cannot be found in the transcript, use \"NA\" as the value.
Score fields (\"Opening Pitch Score\", \"Product Pitch Score\", \"Cross-Sell / Opportunity Handling\", \
\"Closing Effectiveness\", \"Negotiation Strength\") are integers between 2 (poor/absent) and 10 (excellent).";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub drive: DriveConfig,
    pub storage: StorageConfig,
    pub llm: LlmConfig,
    /// Remote warehouse endpoint; local SQLite table when absent
    pub warehouse: Option<WarehouseConfig>,
    pub retry: RetryConfig,
    pub quarantine: QuarantineConfig,
    /// Team member folder name → contact details
    pub manager_map: BTreeMap<String, MemberInfo>,
    /// Manager name → manager email
    pub manager_emails: BTreeMap<String, String>,
    /// Checklist group (e.g. "ERP") → feature → keywords
    pub feature_checklist: BTreeMap<String, BTreeMap<String, Vec<String>>>,
    /// Filename keyword → meeting type label
    pub meeting_types: BTreeMap<String, String>,
    pub dashboard: DashboardConfig,
    pub logging: LoggingConfig,
}

/// Folder layout of the recording store
///
/// Recordings live under `inbox_root/<city>/<team member>/<file>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub inbox_root: PathBuf,
    pub processed_folder: PathBuf,
    pub quarantine_folder: PathBuf,
    /// Member-level folder names skipped during discovery (case-insensitive)
    pub reserved_folder_names: Vec<String>,
    /// Accepted media file extensions (lowercase, no dot)
    pub media_extensions: Vec<String>,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            inbox_root: PathBuf::from("./drive/inbox"),
            processed_folder: PathBuf::from("./drive/Processed Meetings"),
            quarantine_folder: PathBuf::from("./drive/Quarantined Meetings"),
            reserved_folder_names: vec![
                "processed meetings".to_string(),
                "quarantined meetings".to_string(),
            ],
            media_extensions: [
                "mp3", "m4a", "wav", "ogg", "oga", "aac", "flac", "opus", "mp4", "mov", "webm",
                "mkv", "3gp",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Ledger and results storage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_data_folder().join("mabot.db"),
        }
    }
}

/// Transcription and analysis model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    /// Model used for transcription (and analysis when `analysis_model` is unset)
    pub model: String,
    pub analysis_model: Option<String>,
    pub api_key: Option<String>,
    pub requests_per_minute: u32,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub prompt: Option<String>,
    pub prompt_file: Option<PathBuf>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-1.5-flash".to_string(),
            analysis_model: None,
            api_key: None,
            requests_per_minute: 15,
            timeout_secs: 300,
            temperature: 0.2,
            prompt: None,
            prompt_file: None,
        }
    }
}

impl LlmConfig {
    /// Model used for the analysis call
    pub fn analysis_model(&self) -> &str {
        self.analysis_model.as_deref().unwrap_or(&self.model)
    }

    /// Resolve the API key: environment first, then TOML
    pub fn resolve_api_key(&self) -> Option<String> {
        std::env::var(API_KEY_ENV_VAR)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.api_key.clone().filter(|k| !k.trim().is_empty()))
    }

    /// Load the analysis prompt: prompt file, then inline prompt, then built-in default
    pub fn load_prompt(&self) -> Result<String> {
        if let Some(path) = &self.prompt_file {
            let content = std::fs::read_to_string(path)
                .map_err(|e| Error::Config(format!("Read prompt file {} failed: {}", path.display(), e)))?;
            let content = content.trim();
            if !content.is_empty() {
                return Ok(content.to_string());
            }
            tracing::warn!("Prompt file '{}' is empty, falling back", path.display());
        }

        if let Some(prompt) = self.prompt.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            return Ok(prompt.to_string());
        }

        Ok(DEFAULT_ANALYSIS_PROMPT.to_string())
    }
}

/// Streaming-insert warehouse endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    pub endpoint: String,
    pub table: String,
    /// Environment variable holding the bearer token
    #[serde(default = "default_warehouse_token_env")]
    pub token_env: String,
    #[serde(default = "default_warehouse_timeout")]
    pub timeout_secs: u64,
}

fn default_warehouse_token_env() -> String {
    "MABOT_WAREHOUSE_TOKEN".to_string()
}

fn default_warehouse_timeout() -> u64 {
    30
}

/// Backoff settings shared by every remote call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 800,
            max_delay_ms: 8000,
            jitter_ms: 300,
        }
    }
}

/// Quarantine re-eligibility
///
/// With `auto_retry_after_hours` unset, quarantined files wait for a human.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuarantineConfig {
    pub auto_retry_after_hours: Option<u64>,
    pub max_auto_retries: u32,
}

impl Default for QuarantineConfig {
    fn default() -> Self {
        Self {
            auto_retry_after_hours: None,
            max_auto_retries: 3,
        }
    }
}

/// Contact details for one team member
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemberInfo {
    pub email: Option<String>,
    pub manager: Option<String>,
    pub team: Option<String>,
}

/// Dashboard JSON export
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Result columns removed before publishing
    pub strip_columns: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read config {} failed: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)?;
        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".to_string()));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(Error::Config(
                "retry.max_delay_ms must not be smaller than retry.base_delay_ms".to_string(),
            ));
        }
        if self.drive.inbox_root.as_os_str().is_empty() {
            return Err(Error::Config("drive.inbox_root must not be empty".to_string()));
        }
        if self.drive.processed_folder == self.drive.quarantine_folder {
            return Err(Error::Config(
                "drive.processed_folder and drive.quarantine_folder must differ".to_string(),
            ));
        }
        if self.llm.requests_per_minute == 0 {
            return Err(Error::Config("llm.requests_per_minute must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Contact details for a team member, if mapped
    pub fn member_info(&self, member: &str) -> Option<&MemberInfo> {
        self.manager_map.get(member.trim())
    }

    /// Email for a manager, if mapped
    pub fn manager_email(&self, manager: &str) -> Option<&str> {
        self.manager_emails.get(manager.trim()).map(String::as_str)
    }
}

/// Config file resolution priority:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. `./mabot.toml` in the working directory
/// 4. Platform config directory (`<config_dir>/mabot/config.toml`)
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Result<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Ok(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    // Priority 3: Working directory
    let local = PathBuf::from("mabot.toml");
    if local.exists() {
        return Ok(local);
    }

    // Priority 4: Platform config directory
    let user_config = dirs::config_dir().map(|d| d.join("mabot").join("config.toml"));
    match user_config {
        Some(path) if path.exists() => Ok(path),
        Some(path) => Err(Error::Config(format!(
            "No config file found (tried --config, {}, ./mabot.toml, {})",
            env_var_name,
            path.display()
        ))),
        None => Err(Error::Config("Could not determine config directory".to_string())),
    }
}

/// Get OS-dependent default data folder
fn default_data_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("mabot"))
        .unwrap_or_else(|| PathBuf::from("./mabot_data"))
}
