//! Pipeline stages, per-file outcomes and run summaries

use crate::models::AnalysisRecord;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-file processing stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Download,
    Transcribe,
    Redact,
    Analyze,
    Enrich,
    Persist,
    Relocate,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Download => "download",
            Stage::Transcribe => "transcribe",
            Stage::Redact => "redact",
            Stage::Analyze => "analyze",
            Stage::Enrich => "enrich",
            Stage::Persist => "persist",
            Stage::Relocate => "relocate",
        }
    }

    /// Prefix of the quarantine reason for a failure at this stage
    pub fn failure_prefix(&self) -> &'static str {
        match self {
            Stage::Download => "download failed",
            Stage::Transcribe => "transcription failed",
            Stage::Redact => "redaction failed",
            Stage::Analyze => "analysis failed",
            Stage::Enrich => "enrichment failed",
            Stage::Persist => "persistence failed",
            Stage::Relocate => "relocation failed",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a file was quarantined; displays as `"<stage> failed: <cause>"`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarantineReason {
    pub stage: Stage,
    pub message: String,
}

impl QuarantineReason {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for QuarantineReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.stage.failure_prefix(), self.message)
    }
}

/// Terminal result of processing one file in one run
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    Success(Box<AnalysisRecord>),
    Quarantined(QuarantineReason),
    /// Rate limit hit; the file is left untouched and the run stops
    DeferredQuota { stage: Stage, message: String },
}

impl PipelineOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            PipelineOutcome::Success(_) => "success",
            PipelineOutcome::Quarantined(_) => "quarantined",
            PipelineOutcome::DeferredQuota { .. } => "deferred_quota",
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, PipelineOutcome::DeferredQuota { .. })
    }
}

/// Run-level counters returned by one scheduled tick
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    /// Candidates returned by discovery
    pub discovered: usize,
    pub processed: usize,
    pub quarantined: usize,
    /// Outcome committed by an earlier run (only the move was retried)
    pub skipped: usize,
    /// Files the run never reached, plus the file that hit the quota
    pub deferred: usize,
    /// Outcomes not committed because the ledger write failed
    pub ledger_failures: usize,
    pub relocation_failures: usize,
    /// Quarantined files returned to the inbox before the run
    pub restored: usize,
    pub stopped_on_quota: bool,
}

impl RunSummary {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            ..Default::default()
        }
    }
}
