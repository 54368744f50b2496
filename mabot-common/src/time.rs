//! Timestamp utilities

use chrono::{DateTime, NaiveDate, Utc};

/// Format a timestamp the way ledger rows display it (`YYYY-MM-DD HH:MM:SS`, UTC)
pub fn format_ledger_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Format a meeting date as `dd/mm/yy`
pub fn format_meeting_date(date: NaiveDate) -> String {
    date.format("%d/%m/%y").to_string()
}

/// Whole minutes in a millisecond duration (truncating)
pub fn millis_to_whole_minutes(millis: u64) -> u64 {
    millis / 60_000
}
