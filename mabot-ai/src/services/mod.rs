//! Pipeline services: retry, redaction, enrichment, the per-file pipeline and
//! the run coordinator

pub mod coordinator;
pub mod dashboard_export;
pub mod enrichment;
pub mod media_info;
pub mod pipeline;
pub mod quarantine_recovery;
pub mod redaction;
pub mod retry;

pub use coordinator::RunCoordinator;
pub use pipeline::Pipeline;
pub use retry::{with_retry, RetryPolicy};
