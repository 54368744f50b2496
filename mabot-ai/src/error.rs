//! Error types for mabot-ai
//!
//! Every remote-call failure maps to exactly one [`RemoteError`] kind. The
//! retry policy absorbs `Retryable`; `NonRetryable` ends up as a quarantine
//! reason; `QuotaExceeded` halts the run.

use thiserror::Error;

/// Classified failure of a remote call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Transient network/service condition, worth retrying
    #[error("{0}")]
    Retryable(String),

    /// Validation error or permanent rejection
    #[error("{0}")]
    NonRetryable(String),

    /// Rate-limit signal from the model provider
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),
}

/// Coarse kind of a [`RemoteError`], for logging and matching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Retryable,
    NonRetryable,
    QuotaExceeded,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Retryable => "retryable",
            ErrorKind::NonRetryable => "non_retryable",
            ErrorKind::QuotaExceeded => "quota_exceeded",
        };
        f.write_str(s)
    }
}

const QUOTA_KEYWORDS: &[&str] = &[
    "resourceexhausted",
    "resource exhausted",
    "resource_exhausted",
    "quota exceeded",
    "quota",
    "too many requests",
    "rate limit",
    "rate-limit",
    "429",
];

impl RemoteError {
    pub fn retryable(msg: impl Into<String>) -> Self {
        RemoteError::Retryable(msg.into())
    }

    pub fn non_retryable(msg: impl Into<String>) -> Self {
        RemoteError::NonRetryable(msg.into())
    }

    pub fn quota(msg: impl Into<String>) -> Self {
        RemoteError::QuotaExceeded(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RemoteError::Retryable(_) => ErrorKind::Retryable,
            RemoteError::NonRetryable(_) => ErrorKind::NonRetryable,
            RemoteError::QuotaExceeded(_) => ErrorKind::QuotaExceeded,
        }
    }

    pub fn is_quota(&self) -> bool {
        matches!(self, RemoteError::QuotaExceeded(_))
    }

    /// Message without the kind prefix
    pub fn message(&self) -> &str {
        match self {
            RemoteError::Retryable(m) | RemoteError::NonRetryable(m) | RemoteError::QuotaExceeded(m) => m,
        }
    }

    /// Classify an HTTP status returned by a remote service
    ///
    /// 429 is quota; 408 and 5xx are transient; every other non-success status
    /// is a permanent rejection.
    pub fn from_status(status: u16, body: &str) -> Self {
        let msg = format!("HTTP {}: {}", status, truncate_chars(body.trim(), 300));
        match status {
            429 => RemoteError::QuotaExceeded(msg),
            408 | 500..=599 => {
                // Some providers report exhaustion as 503 with a quota body
                if looks_like_quota(body) {
                    RemoteError::QuotaExceeded(msg)
                } else {
                    RemoteError::Retryable(msg)
                }
            }
            _ => RemoteError::NonRetryable(msg),
        }
    }

    /// Classify an error message with no structured status
    ///
    /// Quota keywords win; anything else unclassified defaults to NonRetryable.
    pub fn from_message(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        if looks_like_quota(&msg) {
            RemoteError::QuotaExceeded(msg)
        } else {
            RemoteError::NonRetryable(msg)
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return RemoteError::from_status(status.as_u16(), &err.to_string());
        }
        if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
            RemoteError::Retryable(format!("network error: {}", err))
        } else if err.is_decode() {
            RemoteError::NonRetryable(format!("malformed response: {}", err))
        } else {
            RemoteError::from_message(err.to_string())
        }
    }
}

impl From<std::io::Error> for RemoteError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind as Io;
        match err.kind() {
            Io::Interrupted | Io::TimedOut | Io::WouldBlock | Io::ConnectionReset | Io::ConnectionAborted => {
                RemoteError::Retryable(err.to_string())
            }
            _ => RemoteError::NonRetryable(err.to_string()),
        }
    }
}

/// True for genuine quota/rate-limit messages only
pub fn looks_like_quota(msg: &str) -> bool {
    let lower = msg.to_lowercase();
    QUOTA_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Truncate to at most `max` characters (not bytes)
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Ledger store failure
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A Success entry already exists and must not be overwritten
    #[error("file {0} already has a success entry")]
    AlreadyProcessed(String),

    /// Store unreachable or write not acknowledged
    #[error("ledger store error: {0}")]
    Store(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        LedgerError::Store(err.to_string())
    }
}
