//! Discovered recording files

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque handle the content store can fetch bytes from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentRef(pub String);

impl std::fmt::Display for ContentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a recording sits in the folder hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContext {
    pub city: String,
    /// Team member folder name (the meeting owner)
    pub member: String,
    /// Raw filename including extension
    pub file_name: String,
}

impl FileContext {
    /// `city/member` path segment the file was discovered under
    pub fn origin(&self) -> String {
        format!("{}/{}", self.city, self.member)
    }
}

/// A recording produced by discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateFile {
    /// Unique, stable file identity (ledger key)
    pub id: String,
    pub context: FileContext,
    pub content_ref: ContentRef,
    pub mime_type: Option<String>,
    pub size_bytes: Option<u64>,
    pub created_at: Option<DateTime<Utc>>,
    /// Media duration reported by the store, when known
    pub duration_ms: Option<u64>,
}

impl CandidateFile {
    pub fn new(id: impl Into<String>, context: FileContext, content_ref: ContentRef) -> Self {
        Self {
            id: id.into(),
            context,
            content_ref,
            mime_type: None,
            size_bytes: None,
            created_at: None,
            duration_ms: None,
        }
    }

    pub fn file_name(&self) -> &str {
        &self.context.file_name
    }
}

/// A file sitting in the quarantine location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantinedFile {
    pub id: String,
    pub file_name: String,
    pub quarantined_at: DateTime<Utc>,
    /// `city/member` folder it was quarantined from, if known
    pub origin: Option<String>,
}
