//! Quarantine auto-retry
//!
//! With `[quarantine].auto_retry_after_hours` set, quarantined files older
//! than the cool-off window are returned to the folder they came from, so the
//! next discovery picks them up again. Files whose ledger attempt count has
//! reached `max_auto_retries` stay quarantined for manual triage.

use crate::types::{ContentStore, Ledger};
use chrono::{DateTime, Duration, Utc};
use mabot_common::config::QuarantineConfig;
use tracing::{debug, info, warn};

/// Restore eligible quarantined files; returns how many were moved back
///
/// Failures are logged and skipped; recovery never blocks the run.
pub async fn restore_eligible(
    config: &QuarantineConfig,
    store: &dyn ContentStore,
    ledger: &dyn Ledger,
    now: DateTime<Utc>,
) -> usize {
    let Some(hours) = config.auto_retry_after_hours else {
        return 0;
    };
    let cool_off = Duration::hours(hours as i64);

    let quarantined = match store.list_quarantined().await {
        Ok(files) => files,
        Err(e) => {
            warn!(error = %e, "Could not list quarantined files");
            return 0;
        }
    };

    let mut restored = 0;
    for file in quarantined {
        if now - file.quarantined_at < cool_off {
            continue;
        }

        match ledger.entry(&file.id).await {
            Ok(Some(entry)) if entry.is_success() => {
                warn!(file_id = %file.id, "Quarantined file already has a success entry, leaving it");
                continue;
            }
            Ok(Some(entry)) if entry.attempt_count >= config.max_auto_retries => {
                debug!(
                    file_id = %file.id,
                    attempts = entry.attempt_count,
                    "Auto-retry budget used up, left for manual triage"
                );
                continue;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(file_id = %file.id, error = %e, "Ledger lookup failed, skipping restore");
                continue;
            }
        }

        match store.restore(&file).await {
            Ok(()) => {
                info!(file_id = %file.id, file_name = %file.file_name, hours, "Quarantined file moved back for retry");
                restored += 1;
            }
            Err(e) => warn!(file_id = %file.id, error = %e, "Could not restore quarantined file"),
        }
    }

    restored
}
