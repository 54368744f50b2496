//! Transcript PII scrubbing
//!
//! Pure and infallible: email addresses and phone numbers are replaced with
//! fixed placeholders before the transcript leaves the process for analysis.

use once_cell::sync::Lazy;
use regex::Regex;

pub const EMAIL_PLACEHOLDER: &str = "[REDACTED_EMAIL]";
pub const PHONE_PLACEHOLDER: &str = "[REDACTED_PHONE]";

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("static email pattern")
});

// 10 to 13 digits with short separator runs; shorter runs (dates, amounts) are left alone.
// An opening parenthesis before the number is part of the match.
static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\(?\+|\(|\b)\d(?:[ ().-]{0,2}\d){9,12}\b").expect("static phone pattern")
});

/// Replace emails and phone numbers in `text`
pub fn redact(text: &str) -> String {
    let without_emails = EMAIL_RE.replace_all(text, EMAIL_PLACEHOLDER);
    PHONE_RE.replace_all(&without_emails, PHONE_PLACEHOLDER).into_owned()
}
