//! Run coordinator integration tests
//!
//! Drives `RunCoordinator::run_once` over scripted fakes and a real SQLite
//! ledger, checking commit order, quota handling and idempotence.

mod helpers;

use chrono::{Duration, Utc};
use helpers::{candidate, fast_retry, init_test_logging, FailingLedger, Harness, MoveRecord};
use mabot_ai::models::{LedgerEntry, LedgerStatus, QuarantineReason, QuarantinedFile, Stage};
use mabot_ai::types::{Collaborators, Destination, Ledger};
use mabot_ai::{RemoteError, RunCoordinator};
use mabot_common::AppConfig;
use std::sync::Arc;

#[tokio::test]
async fn test_transient_failures_are_absorbed_by_retry() {
    init_test_logging();
    let h = Harness::new(vec![candidate("f1")]).await;
    h.transcriber
        .script
        .fail("f1", RemoteError::retryable("HTTP 503: unavailable"), 2);

    let summary = h.coordinator(AppConfig::default()).run_once().await.unwrap();

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.quarantined, 0);
    assert_eq!(h.transcriber.script.calls_for("f1"), 3);

    let entry = h.ledger.entry("f1").await.unwrap().expect("ledger entry");
    assert_eq!(entry.status, LedgerStatus::Success);
    assert!(entry.error.is_none());

    assert_eq!(
        h.store.moves(),
        vec![MoveRecord {
            file_id: "f1".to_string(),
            destination: Destination::Processed,
            note: None,
        }]
    );
    assert_eq!(h.spreadsheet.rows().len(), 1);
    assert_eq!(h.warehouse.rows().len(), 1);
}

#[tokio::test]
async fn test_quota_stops_run_and_leaves_rest_untouched() {
    init_test_logging();
    let h = Harness::new(vec![candidate("f1"), candidate("f2"), candidate("f3")]).await;
    h.analyzer
        .script
        .push("f2", Err(RemoteError::quota("HTTP 429: Resource has been exhausted")));

    let summary = h.coordinator(AppConfig::default()).run_once().await.unwrap();

    assert!(summary.stopped_on_quota);
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.deferred, 2);
    assert_eq!(summary.quarantined, 0);

    // Quota is never retried
    assert_eq!(h.analyzer.script.calls_for("f2"), 1);

    assert!(h.ledger.entry("f2").await.unwrap().is_none());
    assert!(h.ledger.entry("f3").await.unwrap().is_none());
    assert_eq!(h.store.downloads.calls_for("f3"), 0);

    let moved: Vec<String> = h.store.moves().into_iter().map(|m| m.file_id).collect();
    assert_eq!(moved, vec!["f1".to_string()]);
}

#[tokio::test]
async fn test_deferred_files_are_processed_on_next_run() {
    init_test_logging();
    let h = Harness::new(vec![candidate("f1"), candidate("f2")]).await;
    h.transcriber
        .script
        .push("f1", Err(RemoteError::quota("rate limit reached")));

    let first = h.coordinator(AppConfig::default()).run_once().await.unwrap();
    assert!(first.stopped_on_quota);
    assert_eq!(first.deferred, 2);
    assert_eq!(h.analyzer.script.calls(), 0);
    assert!(h.store.moves().is_empty());

    let second = h.coordinator(AppConfig::default()).run_once().await.unwrap();
    assert!(!second.stopped_on_quota);
    assert_eq!(second.processed, 2);
    assert!(h.ledger.is_processed("f1").await.unwrap());
    assert!(h.ledger.is_processed("f2").await.unwrap());
}

#[tokio::test]
async fn test_exhausted_warehouse_retries_quarantine_file() {
    init_test_logging();
    let h = Harness::new(vec![candidate("f1")]).await;
    h.warehouse
        .script
        .fail("f1", RemoteError::retryable("HTTP 503: backend error"), 3);

    let summary = h.coordinator(AppConfig::default()).run_once().await.unwrap();

    assert_eq!(summary.processed, 0);
    assert_eq!(summary.quarantined, 1);
    assert_eq!(h.warehouse.script.calls_for("f1"), 3);

    let entry = h.ledger.entry("f1").await.unwrap().expect("ledger entry");
    assert_eq!(entry.status, LedgerStatus::Quarantined);
    let error = entry.error.expect("quarantine reason");
    assert!(error.starts_with("persistence failed: warehouse: HTTP 503"), "got {}", error);
    assert!(error.contains("gave up after 3 attempts"));

    let moves = h.store.moves();
    assert_eq!(moves.len(), 1);
    assert_eq!(moves[0].destination, Destination::Quarantine);
    let note = moves[0].note.as_deref().expect("note attached");
    assert!(note.starts_with("Quarantined: persistence failed: warehouse"));
}

#[tokio::test]
async fn test_quarantine_reason_names_failing_stage() {
    init_test_logging();
    let h = Harness::new(vec![candidate("dl"), candidate("empty"), candidate("bad")]).await;
    h.store
        .downloads
        .push("dl", Err(RemoteError::non_retryable("HTTP 404: file not found")));
    h.transcriber.script.push("empty", Ok("   \n".to_string()));
    h.analyzer.script.push(
        "bad",
        Err(RemoteError::non_retryable("analysis response failed validation: missing field")),
    );

    let summary = h.coordinator(AppConfig::default()).run_once().await.unwrap();
    assert_eq!(summary.quarantined, 3);

    let error_of = |entry: Option<LedgerEntry>| entry.and_then(|e| e.error).unwrap_or_default();
    assert!(error_of(h.ledger.entry("dl").await.unwrap()).starts_with("download failed: HTTP 404"));
    assert_eq!(
        error_of(h.ledger.entry("empty").await.unwrap()),
        "transcription failed: empty transcript"
    );
    assert!(error_of(h.ledger.entry("bad").await.unwrap()).starts_with("analysis failed: "));

    // Nothing reached the sinks
    assert!(h.spreadsheet.rows().is_empty());
    assert!(h.warehouse.rows().is_empty());
}

#[tokio::test]
async fn test_second_run_makes_no_remote_calls() {
    init_test_logging();
    let h = Harness::new(vec![candidate("f1"), candidate("f2")]).await;

    let first = h.coordinator(AppConfig::default()).run_once().await.unwrap();
    assert_eq!(first.processed, 2);
    let calls_after_first = h.remote_calls_for("f1") + h.remote_calls_for("f2");

    // Copies of both files turn up in the inbox again
    h.discovery.offer(candidate("f1"));
    h.discovery.offer(candidate("f2"));

    let second = h.coordinator(AppConfig::default()).run_once().await.unwrap();
    assert_eq!(second.processed, 0);
    assert_eq!(second.skipped, 2);
    assert_eq!(h.remote_calls_for("f1") + h.remote_calls_for("f2"), calls_after_first);
    assert_eq!(h.spreadsheet.rows().len(), 2);

    // They only get moved out of the way
    let moves = h.store.moves();
    assert_eq!(moves.len(), 4);
    assert!(moves.iter().all(|m| m.destination == Destination::Processed));
}

#[tokio::test]
async fn test_ledger_failure_leaves_file_in_place() {
    init_test_logging();
    let h = Harness::new(vec![candidate("f1")]).await;
    let collaborators = Collaborators {
        ledger: Arc::new(FailingLedger),
        ..h.collaborators()
    };
    let coordinator =
        RunCoordinator::new(Arc::new(AppConfig::default()), collaborators).with_retry_policy(fast_retry(3));

    let summary = coordinator.run_once().await.unwrap();

    assert_eq!(summary.ledger_failures, 1);
    assert_eq!(summary.processed, 0);
    assert!(h.store.moves().is_empty());
}

#[tokio::test]
async fn test_relocation_failure_keeps_ledger_commit() {
    init_test_logging();
    let h = Harness::new(vec![candidate("f1")]).await;
    h.store
        .moves_script
        .push("f1", Err(RemoteError::non_retryable("permission denied")));

    let summary = h.coordinator(AppConfig::default()).run_once().await.unwrap();

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.relocation_failures, 1);
    assert!(h.ledger.is_processed("f1").await.unwrap());
    assert!(h.store.moves().is_empty());
}

#[tokio::test]
async fn test_failed_move_is_finished_on_next_run() {
    init_test_logging();
    let h = Harness::new(vec![candidate("f1")]).await;
    h.store
        .moves_script
        .push("f1", Err(RemoteError::non_retryable("permission denied")));

    let first = h.coordinator(AppConfig::default()).run_once().await.unwrap();
    assert_eq!(first.processed, 1);
    assert_eq!(first.relocation_failures, 1);
    let calls_after_first = h.remote_calls_for("f1");

    let second = h.coordinator(AppConfig::default()).run_once().await.unwrap();

    assert_eq!(second.discovered, 1);
    assert_eq!(second.skipped, 1);
    assert_eq!(second.processed, 0);
    assert_eq!(second.relocation_failures, 0);
    assert_eq!(h.remote_calls_for("f1"), calls_after_first);
    assert_eq!(
        h.store.moves(),
        vec![MoveRecord {
            file_id: "f1".to_string(),
            destination: Destination::Processed,
            note: None,
        }]
    );

    let third = h.coordinator(AppConfig::default()).run_once().await.unwrap();
    assert_eq!(third.discovered, 0);
}

#[tokio::test]
async fn test_second_failed_move_is_counted_again() {
    init_test_logging();
    let h = Harness::new(vec![candidate("f1")]).await;
    h.store
        .moves_script
        .fail("f1", RemoteError::non_retryable("permission denied"), 2);

    h.coordinator(AppConfig::default()).run_once().await.unwrap();
    let second = h.coordinator(AppConfig::default()).run_once().await.unwrap();

    assert_eq!(second.skipped, 1);
    assert_eq!(second.relocation_failures, 1);
    assert!(h.store.moves().is_empty());
}

#[tokio::test]
async fn test_exhausted_quarantine_is_not_reprocessed() {
    init_test_logging();
    let h = Harness::new(vec![candidate("f1")]).await;
    let reason = QuarantineReason::new(Stage::Analyze, "bad output");
    for _ in 0..3 {
        h.ledger
            .record(&LedgerEntry::quarantined(&candidate("f1"), &reason))
            .await
            .unwrap();
    }

    let mut config = AppConfig::default();
    config.quarantine.max_auto_retries = 3;
    let summary = h.coordinator(config).run_once().await.unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.quarantined, 0);
    assert_eq!(h.remote_calls_for("f1"), 0);
    assert_eq!(
        h.store.moves(),
        vec![MoveRecord {
            file_id: "f1".to_string(),
            destination: Destination::Quarantine,
            note: Some("Quarantined: analysis failed: bad output".to_string()),
        }]
    );
    assert_eq!(h.ledger.entry("f1").await.unwrap().unwrap().attempt_count, 3);
}

#[tokio::test]
async fn test_quarantine_below_budget_is_reprocessed() {
    init_test_logging();
    let h = Harness::new(vec![candidate("f1")]).await;
    let reason = QuarantineReason::new(Stage::Analyze, "bad output");
    h.ledger
        .record(&LedgerEntry::quarantined(&candidate("f1"), &reason))
        .await
        .unwrap();

    let summary = h.coordinator(AppConfig::default()).run_once().await.unwrap();

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.skipped, 0);
    assert_eq!(h.ledger.entry("f1").await.unwrap().unwrap().attempt_count, 2);
}

#[tokio::test]
async fn test_analyzer_only_sees_redacted_transcript() {
    init_test_logging();
    let h = Harness::new(vec![candidate("f1")]).await;

    h.coordinator(AppConfig::default()).run_once().await.unwrap();

    let transcripts = h.analyzer.transcripts();
    assert_eq!(transcripts.len(), 1);
    assert!(!transcripts[0].contains("98765"));
    assert!(!transcripts[0].contains("asha@example.com"));
    assert!(transcripts[0].contains("[REDACTED_PHONE]"));
    assert!(transcripts[0].contains("[REDACTED_EMAIL]"));
}

#[tokio::test]
async fn test_quarantined_file_is_retried_with_attempt_count() {
    init_test_logging();
    let h = Harness::new(vec![candidate("f1")]).await;
    h.analyzer
        .script
        .push("f1", Err(RemoteError::non_retryable("analysis output is not a JSON object")));

    let first = h.coordinator(AppConfig::default()).run_once().await.unwrap();
    assert_eq!(first.quarantined, 1);

    // Put back in the inbox by hand
    h.discovery.offer(candidate("f1"));
    let second = h.coordinator(AppConfig::default()).run_once().await.unwrap();
    assert_eq!(second.processed, 1);

    let entry = h.ledger.entry("f1").await.unwrap().expect("ledger entry");
    assert_eq!(entry.status, LedgerStatus::Success);
    assert_eq!(entry.attempt_count, 2);
    assert!(entry.error.is_none());
}

#[tokio::test]
async fn test_discovery_is_retried() {
    init_test_logging();
    let h = Harness::new(vec![candidate("f1")]).await;
    h.discovery
        .calls
        .fail("discovery", RemoteError::retryable("network error: connection reset"), 2);

    let summary = h.coordinator(AppConfig::default()).run_once().await.unwrap();

    assert_eq!(h.discovery.calls.calls(), 3);
    assert_eq!(summary.discovered, 1);
    assert_eq!(summary.processed, 1);
}

#[tokio::test]
async fn test_discovery_failure_aborts_run() {
    init_test_logging();
    let h = Harness::new(vec![candidate("f1")]).await;
    h.discovery
        .calls
        .push("discovery", Err(RemoteError::non_retryable("HTTP 403: forbidden")));

    let result = h.coordinator(AppConfig::default()).run_once().await;

    assert!(result.is_err());
    assert_eq!(h.store.downloads.calls(), 0);
}

#[tokio::test]
async fn test_aged_quarantined_files_are_restored() {
    init_test_logging();
    let h = Harness::new(Vec::new()).await;
    let now = Utc::now();

    let quarantined = |id: &str, age_hours: i64| QuarantinedFile {
        id: id.to_string(),
        file_name: format!("{}.m4a", id),
        quarantined_at: now - Duration::hours(age_hours),
        origin: Some("Pune/Asha".to_string()),
    };
    h.store.add_quarantined(quarantined("old", 48));
    h.store.add_quarantined(quarantined("fresh", 1));
    h.store.add_quarantined(quarantined("exhausted", 72));

    let reason = QuarantineReason::new(Stage::Analyze, "bad output");
    for _ in 0..3 {
        h.ledger
            .record(&LedgerEntry::quarantined(&candidate("exhausted"), &reason))
            .await
            .unwrap();
    }
    assert_eq!(h.ledger.entry("exhausted").await.unwrap().unwrap().attempt_count, 3);

    let mut config = AppConfig::default();
    config.quarantine.auto_retry_after_hours = Some(24);
    config.quarantine.max_auto_retries = 3;

    let summary = h.coordinator(config).run_once().await.unwrap();

    assert_eq!(summary.restored, 1);
    assert_eq!(h.store.restored(), vec!["old".to_string()]);
}

#[tokio::test]
async fn test_restore_is_off_by_default() {
    init_test_logging();
    let h = Harness::new(Vec::new()).await;
    h.store.add_quarantined(QuarantinedFile {
        id: "old".to_string(),
        file_name: "old.m4a".to_string(),
        quarantined_at: Utc::now() - Duration::days(30),
        origin: None,
    });

    let summary = h.coordinator(AppConfig::default()).run_once().await.unwrap();

    assert_eq!(summary.restored, 0);
    assert!(h.store.restored().is_empty());
}
