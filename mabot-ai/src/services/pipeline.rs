//! Per-file processing pipeline
//!
//! Runs one file through download → transcribe → redact → analyze → enrich →
//! persist and returns exactly one terminal [`PipelineOutcome`]. Relocation
//! (stage 7) is a separate call so the coordinator can commit the ledger
//! entry first.
//!
//! # Error Handling
//! - Every remote call is wrapped by the retry policy with its own budget
//! - `QuotaExceeded` from any stage becomes `DeferredQuota`; the file is never
//!   quarantined by a rate limit
//! - Everything else surfaces as `Quarantined` with a reason naming the stage
//!
//! # Example
//! ```rust,ignore
//! let pipeline = Pipeline::new(config, collaborators);
//! let outcome = pipeline.process(&file).await;
//! ```

use crate::error::{truncate_chars, RemoteError};
use crate::models::{AnalysisRecord, CandidateFile, PipelineOutcome, QuarantineReason, Stage};
use crate::services::enrichment;
use crate::services::media_info;
use crate::services::redaction;
use crate::services::retry::{with_retry, RetryPolicy};
use crate::types::{Collaborators, Destination};
use mabot_common::AppConfig;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Maximum length of the quarantine reason attached to a relocated file
pub const MAX_NOTE_CHARS: usize = 300;

/// Fallback MIME type when discovery could not determine one
const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Per-file state machine
pub struct Pipeline {
    config: Arc<AppConfig>,
    collaborators: Collaborators,
    retry: RetryPolicy,
}

/// Early exit from a stage: the outcome to report
type StageResult<T> = std::result::Result<T, PipelineOutcome>;

impl Pipeline {
    /// Create a pipeline using the configured retry policy
    pub fn new(config: Arc<AppConfig>, collaborators: Collaborators) -> Self {
        let retry = RetryPolicy::from_config(&config.retry);
        Self {
            config,
            collaborators,
            retry,
        }
    }

    /// Replace the retry policy (tests use zero delays)
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Run stages 1-6 for one file
    pub async fn process(&self, file: &CandidateFile) -> PipelineOutcome {
        info!(file_id = %file.id, file_name = %file.file_name(), "Processing file");

        match self.run_stages(file).await {
            Ok(record) => PipelineOutcome::Success(Box::new(record)),
            Err(outcome) => outcome,
        }
    }

    async fn run_stages(&self, file: &CandidateFile) -> StageResult<AnalysisRecord> {
        // Stage 1: Download
        let bytes = with_retry("download", &self.retry, || {
            self.collaborators.store.download(&file.content_ref)
        })
        .await
        .map_err(|e| stage_failure(file, Stage::Download, e))?;

        if bytes.is_empty() {
            return Err(stage_failure(
                file,
                Stage::Download,
                RemoteError::non_retryable("downloaded content is empty"),
            ));
        }
        debug!(file_id = %file.id, bytes = bytes.len(), "Downloaded");

        // Discovery rarely knows the duration; read it from the media itself
        let duration_ms = file.duration_ms.or_else(|| media_info::duration_ms(&bytes));

        // Stage 2: Transcribe
        let mime_type = file.mime_type.as_deref().unwrap_or(DEFAULT_MIME_TYPE);
        let transcript = with_retry("transcribe", &self.retry, || {
            self.collaborators.transcriber.transcribe(&bytes, mime_type)
        })
        .await
        .map_err(|e| stage_failure(file, Stage::Transcribe, e))?;

        // Raw media is not needed past this point
        drop(bytes);

        if transcript.trim().is_empty() {
            return Err(stage_failure(
                file,
                Stage::Transcribe,
                RemoteError::non_retryable("empty transcript"),
            ));
        }
        debug!(file_id = %file.id, chars = transcript.len(), "Transcribed");

        // Stage 3: Redact
        let redacted = redaction::redact(&transcript);

        // Stage 4: Analyze
        let analysis = with_retry("analyze", &self.retry, || {
            self.collaborators.analyzer.analyze(&redacted)
        })
        .await
        .map_err(|e| stage_failure(file, Stage::Analyze, e))?;

        // Stage 5: Enrich
        let measured = CandidateFile {
            duration_ms,
            ..file.clone()
        };
        let record = enrichment::enrich(&self.config, &measured, &analysis, &redacted);
        debug!(
            file_id = %file.id,
            total_score = record.total_score,
            meeting_type = %record.meeting_type,
            "Enriched"
        );

        // Stage 6: Persist (both sinks must succeed)
        with_retry("spreadsheet write", &self.retry, || {
            self.collaborators.spreadsheet.write_row(&record)
        })
        .await
        .map_err(|e| stage_failure(file, Stage::Persist, prefixed("spreadsheet", e)))?;

        with_retry("warehouse insert", &self.retry, || {
            self.collaborators.warehouse.insert_row(&record)
        })
        .await
        .map_err(|e| stage_failure(file, Stage::Persist, prefixed("warehouse", e)))?;

        Ok(record)
    }

    /// Stage 7: move the file to its terminal location
    ///
    /// Deferred files are never moved.
    pub async fn relocate(&self, file: &CandidateFile, outcome: &PipelineOutcome) -> Result<(), RemoteError> {
        let (destination, note) = match outcome {
            PipelineOutcome::Success(_) => (Destination::Processed, None),
            PipelineOutcome::Quarantined(reason) => (Destination::Quarantine, Some(quarantine_note(reason))),
            PipelineOutcome::DeferredQuota { .. } => return Ok(()),
        };

        self.move_to(file, destination, note.as_deref()).await
    }

    /// Move a file under the retry policy
    ///
    /// Also used by the coordinator to finish a relocation that failed on an
    /// earlier run.
    pub async fn move_to(
        &self,
        file: &CandidateFile,
        destination: Destination,
        note: Option<&str>,
    ) -> Result<(), RemoteError> {
        with_retry("relocate", &self.retry, || {
            self.collaborators.store.move_file(file, destination, note)
        })
        .await?;

        info!(file_id = %file.id, destination = %destination, "File relocated");
        Ok(())
    }
}

/// Note attached to a quarantined file: `Quarantined: <reason>`
pub fn quarantine_note(reason: &QuarantineReason) -> String {
    quarantine_note_for(&reason.to_string())
}

/// Same note built from a reason already rendered (e.g. a ledger error)
pub fn quarantine_note_for(message: &str) -> String {
    format!("Quarantined: {}", truncate_chars(message, MAX_NOTE_CHARS))
}

fn prefixed(sink: &str, err: RemoteError) -> RemoteError {
    match err {
        RemoteError::Retryable(m) => RemoteError::Retryable(format!("{}: {}", sink, m)),
        RemoteError::NonRetryable(m) => RemoteError::NonRetryable(format!("{}: {}", sink, m)),
        RemoteError::QuotaExceeded(m) => RemoteError::QuotaExceeded(format!("{}: {}", sink, m)),
    }
}

/// Map a stage error to its terminal outcome
fn stage_failure(file: &CandidateFile, stage: Stage, err: RemoteError) -> PipelineOutcome {
    match err {
        RemoteError::QuotaExceeded(message) => {
            warn!(file_id = %file.id, stage = %stage, error = %message, "Quota exceeded, deferring file");
            PipelineOutcome::DeferredQuota { stage, message }
        }
        // with_retry never hands back Retryable, but an unclassified error still quarantines
        RemoteError::NonRetryable(message) | RemoteError::Retryable(message) => {
            let reason = QuarantineReason::new(stage, message);
            warn!(file_id = %file.id, stage = %stage, reason = %reason, "Stage failed");
            PipelineOutcome::Quarantined(reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quarantine_note_is_prefixed_and_bounded() {
        let reason = QuarantineReason::new(Stage::Transcribe, "x".repeat(1000));
        let note = quarantine_note(&reason);
        assert!(note.starts_with("Quarantined: transcription failed: "));
        assert_eq!(note.chars().count(), "Quarantined: ".len() + MAX_NOTE_CHARS);
    }

    #[test]
    fn test_prefixed_keeps_kind() {
        let err = prefixed("warehouse", RemoteError::non_retryable("HTTP 400"));
        assert_eq!(err, RemoteError::non_retryable("warehouse: HTTP 400"));
        assert!(prefixed("spreadsheet", RemoteError::quota("429")).is_quota());
    }
}
