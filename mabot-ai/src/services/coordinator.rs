//! Run coordinator
//!
//! One call to [`RunCoordinator::run_once`] is one scheduled tick:
//! 1. Optionally return aged quarantined files to the inbox
//! 2. Discover candidates and drop the ones the ledger marks as processed
//! 3. Run the pipeline on each remaining file, strictly one after another
//! 4. Commit each terminal outcome to the ledger, then relocate the file
//!
//! A `DeferredQuota` outcome ends the run early and leaves the file (and every
//! file after it) untouched. The ledger write is the commit point: when it
//! fails, the file is not moved and will be seen again next run.
//!
//! A file still in the inbox after its outcome was committed only lost its
//! move. Success files are moved to the processed folder without running the
//! pipeline again. Quarantined files are reprocessed until their attempt count
//! reaches `[quarantine].max_auto_retries`, then sent back to quarantine with
//! the recorded reason.

use crate::error::LedgerError;
use crate::models::{CandidateFile, LedgerEntry, LedgerStatus, PipelineOutcome, RunSummary};
use crate::services::pipeline::{quarantine_note_for, Pipeline};
use crate::services::quarantine_recovery;
use crate::services::retry::{with_retry, RetryPolicy};
use crate::types::{Collaborators, Destination};
use anyhow::{anyhow, Context, Result};
use mabot_common::AppConfig;
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct RunCoordinator {
    config: Arc<AppConfig>,
    collaborators: Collaborators,
    pipeline: Pipeline,
}

impl RunCoordinator {
    pub fn new(config: Arc<AppConfig>, collaborators: Collaborators) -> Self {
        let pipeline = Pipeline::new(config.clone(), collaborators.clone());
        Self {
            config,
            collaborators,
            pipeline,
        }
    }

    /// Replace the retry policy used for every remote call
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.pipeline = self.pipeline.with_retry_policy(retry);
        self
    }

    /// Execute one scheduled tick
    ///
    /// Errors only when the run cannot start (discovery or ledger unreadable);
    /// per-file failures are reported through the summary.
    pub async fn run_once(&self) -> Result<RunSummary> {
        let mut summary = RunSummary::new();
        info!(run_id = %summary.run_id, "Run started");

        summary.restored = quarantine_recovery::restore_eligible(
            &self.config.quarantine,
            self.collaborators.store.as_ref(),
            self.collaborators.ledger.as_ref(),
            chrono::Utc::now(),
        )
        .await;

        let candidates = with_retry("discovery", self.pipeline.retry_policy(), || {
            self.collaborators.discovery.list_candidate_files()
        })
        .await
        .map_err(|e| anyhow!("Discovery failed: {}", e))?;
        summary.discovered = candidates.len();

        let processed = self
            .collaborators
            .ledger
            .processed_ids()
            .await
            .context("Failed to read processed file ids from ledger")?;

        let (settled, pending): (Vec<&CandidateFile>, Vec<&CandidateFile>) =
            candidates.iter().partition(|c| processed.contains(&c.id));
        summary.skipped = settled.len();

        info!(
            run_id = %summary.run_id,
            discovered = summary.discovered,
            pending = pending.len(),
            skipped = summary.skipped,
            "Candidates filtered"
        );

        for file in settled {
            self.finish_move(file, Destination::Processed, None, &mut summary).await;
        }

        for (index, file) in pending.iter().enumerate() {
            // Another tick may have committed this file since the bulk read
            match self.collaborators.ledger.entry(&file.id).await {
                Ok(Some(entry)) if entry.is_success() => {
                    summary.skipped += 1;
                    self.finish_move(file, Destination::Processed, None, &mut summary).await;
                    continue;
                }
                Ok(Some(entry))
                    if entry.status == LedgerStatus::Quarantined
                        && entry.attempt_count >= self.config.quarantine.max_auto_retries =>
                {
                    warn!(
                        file_id = %file.id,
                        attempts = entry.attempt_count,
                        "Retry budget used up, returning file to quarantine"
                    );
                    summary.skipped += 1;
                    let note = quarantine_note_for(entry.error.as_deref().unwrap_or("unknown error"));
                    self.finish_move(file, Destination::Quarantine, Some(&note), &mut summary)
                        .await;
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    error!(file_id = %file.id, error = %e, "Ledger unavailable, leaving file for next run");
                    summary.ledger_failures += 1;
                    continue;
                }
            }

            let outcome = self.pipeline.process(file).await;

            if let PipelineOutcome::DeferredQuota { stage, message } = &outcome {
                error!(
                    run_id = %summary.run_id,
                    file_id = %file.id,
                    stage = %stage,
                    error = %message,
                    "Quota exceeded, stopping run"
                );
                summary.deferred = pending.len() - index;
                summary.stopped_on_quota = true;
                break;
            }

            self.commit(file, &outcome, &mut summary).await;
        }

        info!(
            run_id = %summary.run_id,
            discovered = summary.discovered,
            processed = summary.processed,
            quarantined = summary.quarantined,
            skipped = summary.skipped,
            deferred = summary.deferred,
            ledger_failures = summary.ledger_failures,
            relocation_failures = summary.relocation_failures,
            restored = summary.restored,
            stopped_on_quota = summary.stopped_on_quota,
            "Run finished"
        );

        Ok(summary)
    }

    /// Record a terminal outcome, then relocate the file
    async fn commit(&self, file: &CandidateFile, outcome: &PipelineOutcome, summary: &mut RunSummary) {
        let entry = match outcome {
            PipelineOutcome::Success(_) => LedgerEntry::success(file),
            PipelineOutcome::Quarantined(reason) => LedgerEntry::quarantined(file, reason),
            PipelineOutcome::DeferredQuota { .. } => return,
        };

        match self.collaborators.ledger.record(&entry).await {
            Ok(()) => {}
            Err(LedgerError::AlreadyProcessed(_)) => {
                warn!(file_id = %file.id, "Ledger already holds a success entry, outcome discarded");
                summary.skipped += 1;
                return;
            }
            Err(e) => {
                error!(
                    file_id = %file.id,
                    outcome = outcome.label(),
                    error = %e,
                    "Ledger write failed, file left untouched"
                );
                summary.ledger_failures += 1;
                return;
            }
        }

        match outcome {
            PipelineOutcome::Success(_) => {
                info!(file_id = %file.id, "File processed");
                summary.processed += 1;
            }
            PipelineOutcome::Quarantined(reason) => {
                warn!(file_id = %file.id, reason = %reason, "File quarantined");
                summary.quarantined += 1;
            }
            PipelineOutcome::DeferredQuota { .. } => {}
        }

        if let Err(e) = self.pipeline.relocate(file, outcome).await {
            error!(file_id = %file.id, error = %e, "Relocation failed after ledger commit");
            summary.relocation_failures += 1;
        }
    }

    /// Move a file whose outcome an earlier run already committed
    async fn finish_move(
        &self,
        file: &CandidateFile,
        destination: Destination,
        note: Option<&str>,
        summary: &mut RunSummary,
    ) {
        info!(file_id = %file.id, destination = %destination, "Committed file still in inbox, moving it");
        if let Err(e) = self.pipeline.move_to(file, destination, note).await {
            error!(file_id = %file.id, error = %e, "Relocation failed again");
            summary.relocation_failures += 1;
        }
    }
}
