//! Data models for mabot-ai
//!
//! Value objects passed through the pipeline. None of them is mutated after
//! creation.

pub mod analysis;
pub mod candidate;
pub mod ledger_entry;
pub mod outcome;

pub use analysis::{AiAnalysis, AnalysisRecord, Scores, NOT_AVAILABLE, RESULT_HEADERS};
pub use candidate::{CandidateFile, ContentRef, FileContext, QuarantinedFile};
pub use ledger_entry::{LedgerEntry, LedgerStatus};
pub use outcome::{PipelineOutcome, QuarantineReason, RunSummary, Stage};
