//! Collaborator traits
//!
//! The pipeline core only knows these seams. Each one reports failures as a
//! classified [`RemoteError`] (or [`LedgerError`] for the ledger store), so the
//! retry policy and the pipeline can route them without inspecting adapter
//! internals.
//!
//! # Example
//! ```rust,ignore
//! pub struct EchoTranscriber;
//!
//! #[async_trait::async_trait]
//! impl Transcriber for EchoTranscriber {
//!     async fn transcribe(&self, bytes: &[u8], _mime_type: &str) -> Result<String, RemoteError> {
//!         Ok(String::from_utf8_lossy(bytes).into_owned())
//!     }
//! }
//! ```

use crate::error::{LedgerError, RemoteError};
use crate::models::{AiAnalysis, AnalysisRecord, CandidateFile, ContentRef, LedgerEntry, QuarantinedFile};
use std::collections::HashSet;
use std::sync::Arc;

/// Terminal storage location for a handled file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Processed,
    Quarantine,
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Destination::Processed => f.write_str("processed"),
            Destination::Quarantine => f.write_str("quarantine"),
        }
    }
}

/// Lists recordings that are not yet in a terminal location
#[async_trait::async_trait]
pub trait Discovery: Send + Sync {
    /// Candidates in a deterministic order (city, member, creation time, name)
    async fn list_candidate_files(&self) -> Result<Vec<CandidateFile>, RemoteError>;
}

/// Fetches and relocates recordings
#[async_trait::async_trait]
pub trait ContentStore: Send + Sync {
    async fn download(&self, content_ref: &ContentRef) -> Result<Vec<u8>, RemoteError>;

    /// Move a file to a terminal location, attaching `note` when given
    async fn move_file(
        &self,
        file: &CandidateFile,
        destination: Destination,
        note: Option<&str>,
    ) -> Result<(), RemoteError>;

    /// Files currently sitting in the quarantine location
    async fn list_quarantined(&self) -> Result<Vec<QuarantinedFile>, RemoteError>;

    /// Return a quarantined file to the folder it came from
    async fn restore(&self, file: &QuarantinedFile) -> Result<(), RemoteError>;
}

/// Speech-to-text
#[async_trait::async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, bytes: &[u8], mime_type: &str) -> Result<String, RemoteError>;
}

/// Structured analysis of a redacted transcript
#[async_trait::async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, transcript: &str) -> Result<AiAnalysis, RemoteError>;
}

/// Human-facing results view
#[async_trait::async_trait]
pub trait SpreadsheetSink: Send + Sync {
    async fn write_row(&self, record: &AnalysisRecord) -> Result<(), RemoteError>;
}

/// Analytics warehouse
#[async_trait::async_trait]
pub trait WarehouseSink: Send + Sync {
    async fn insert_row(&self, record: &AnalysisRecord) -> Result<(), RemoteError>;
}

/// Durable per-file outcome store; the only authority on "already handled"
#[async_trait::async_trait]
pub trait Ledger: Send + Sync {
    /// True iff a Success entry exists for the file
    async fn is_processed(&self, file_id: &str) -> Result<bool, LedgerError>;

    /// Every file id with a Success entry
    async fn processed_ids(&self) -> Result<HashSet<String>, LedgerError>;

    /// Commit a terminal outcome; returns only once the write is acknowledged
    async fn record(&self, entry: &LedgerEntry) -> Result<(), LedgerError>;

    async fn entry(&self, file_id: &str) -> Result<Option<LedgerEntry>, LedgerError>;
}

/// Every collaborator one run needs
#[derive(Clone)]
pub struct Collaborators {
    pub discovery: Arc<dyn Discovery>,
    pub store: Arc<dyn ContentStore>,
    pub transcriber: Arc<dyn Transcriber>,
    pub analyzer: Arc<dyn Analyzer>,
    pub spreadsheet: Arc<dyn SpreadsheetSink>,
    pub warehouse: Arc<dyn WarehouseSink>,
    pub ledger: Arc<dyn Ledger>,
}
