//! Ledger entries

use crate::error::truncate_chars;
use crate::models::{CandidateFile, QuarantineReason};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum stored length of a quarantine error note
pub const MAX_LEDGER_ERROR_CHARS: usize = 500;

/// Terminal status recorded for a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerStatus {
    Success,
    Quarantined,
}

impl LedgerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerStatus::Success => "success",
            LedgerStatus::Quarantined => "quarantined",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(LedgerStatus::Success),
            "quarantined" => Some(LedgerStatus::Quarantined),
            _ => None,
        }
    }
}

impl std::fmt::Display for LedgerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ledger row; `error` is present iff the status is Quarantined
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub file_id: String,
    pub file_name: String,
    pub status: LedgerStatus,
    pub error: Option<String>,
    /// `city/member` folder the file came from
    pub origin: Option<String>,
    /// Number of terminal outcomes recorded for this file
    pub attempt_count: u32,
    pub recorded_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn success(file: &CandidateFile) -> Self {
        Self {
            file_id: file.id.clone(),
            file_name: file.file_name().to_string(),
            status: LedgerStatus::Success,
            error: None,
            origin: Some(file.context.origin()),
            attempt_count: 1,
            recorded_at: Utc::now(),
        }
    }

    pub fn quarantined(file: &CandidateFile, reason: &QuarantineReason) -> Self {
        Self {
            file_id: file.id.clone(),
            file_name: file.file_name().to_string(),
            status: LedgerStatus::Quarantined,
            error: Some(truncate_chars(&reason.to_string(), MAX_LEDGER_ERROR_CHARS)),
            origin: Some(file.context.origin()),
            attempt_count: 1,
            recorded_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == LedgerStatus::Success
    }
}
