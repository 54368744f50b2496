//! Enrichment: merges model output with folder- and filename-derived fields
//!
//! Every function here is pure. Missing inputs fall back to `"NA"` (or
//! `"Unknown"` for owner and meeting type); nothing in this stage can fail.

use crate::models::{AiAnalysis, AnalysisRecord, CandidateFile, NOT_AVAILABLE, RESULT_HEADERS};
use chrono::NaiveDate;
use mabot_common::time::{format_meeting_date, millis_to_whole_minutes};
use mabot_common::AppConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

pub const UNKNOWN: &str = "Unknown";
pub const UNKNOWN_SOCIETY: &str = "Unknown Society";

#[derive(Debug, Clone, Copy)]
enum DateOrder {
    DayMonthYear,
    YearMonthDay,
}

// Tried in order; the first valid calendar date wins
static DATE_PATTERNS: Lazy<Vec<(Regex, DateOrder)>> = Lazy::new(|| {
    [
        (r"\b(\d{1,2})[-/.](\d{1,2})[-/.](\d{4})\b", DateOrder::DayMonthYear),
        (r"\b(\d{1,2})[-/.](\d{1,2})[-/.](\d{2})\b", DateOrder::DayMonthYear),
        (r"\b(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})\b", DateOrder::YearMonthDay),
        (r"\b(20\d{2})(\d{2})(\d{2})\b", DateOrder::YearMonthDay),
    ]
    .into_iter()
    .map(|(pattern, order)| (Regex::new(pattern).expect("static date pattern"), order))
    .collect()
});

static NAME_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[_\-|.]+").expect("static separator pattern"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static whitespace pattern"));
static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").expect("static punctuation pattern"));

/// Build the persisted record for one analyzed file
///
/// `transcript` is the redacted transcript; it feeds the checklist coverage.
pub fn enrich(
    config: &AppConfig,
    file: &CandidateFile,
    analysis: &AiAnalysis,
    transcript: &str,
) -> AnalysisRecord {
    let member = file.context.member.trim();
    let info = config.member_info(member);

    let owner = if member.is_empty() { UNKNOWN.to_string() } else { member.to_string() };

    let mapped_manager = info.and_then(|i| i.manager.clone()).filter(|m| !m.trim().is_empty());
    let manager_email = mapped_manager
        .as_deref()
        .and_then(|m| config.manager_email(m))
        .map(str::to_string);

    let or_detail = |mapped: Option<String>, header: &str| -> String {
        mapped
            .filter(|v| !v.trim().is_empty())
            .or_else(|| analysis.detail_text(header))
            .unwrap_or_else(|| NOT_AVAILABLE.to_string())
    };

    let (coverage, missed) = feature_coverage(transcript, &config.feature_checklist);

    let scores = analysis.scores();
    let mut record = AnalysisRecord {
        file_id: file.id.clone(),
        file_name: file.file_name().to_string(),
        meeting_date: pick_meeting_date(file),
        identifier: society_from_filename(file.file_name()),
        meeting_type: meeting_type(config, analysis, file.file_name()),
        owner,
        email: or_detail(info.and_then(|i| i.email.clone()), "Email Id"),
        manager: or_detail(mapped_manager, "Manager"),
        manager_email: or_detail(manager_email, "Manager Email"),
        team: or_detail(info.and_then(|i| i.team.clone()), "Team"),
        city: non_empty_or_na(&file.context.city),
        duration_min: duration_minutes(file.duration_ms),
        total_score: scores.total(),
        percent_score: scores.percent(),
        scores,
        feature_coverage: coverage
            .or_else(|| analysis.detail_text("Feature Checklist Coverage"))
            .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        missed_opportunities: missed
            .or_else(|| analysis.detail_text("Missed Opportunities"))
            .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        media_link: file.content_ref.to_string(),
        details: BTreeMap::new(),
    };

    let details: BTreeMap<String, String> = RESULT_HEADERS
        .iter()
        .filter(|h| record.typed_field(h).is_none())
        .filter_map(|h| analysis.detail_text(h).map(|v| (h.to_string(), v)))
        .collect();
    record.details = details;

    if info.is_none() {
        tracing::warn!(member = %member, file_id = %file.id, "No manager map entry for team member");
    }

    record
}

/// Date for the sheet: filename first, then creation time, else `"NA"`
pub fn pick_meeting_date(file: &CandidateFile) -> String {
    if let Some(date) = extract_date_from_name(file.file_name()) {
        return format_meeting_date(date);
    }
    if let Some(created) = file.created_at {
        return format_meeting_date(created.date_naive());
    }
    tracing::debug!(file_id = %file.id, "No meeting date found");
    NOT_AVAILABLE.to_string()
}

/// First valid calendar date embedded in a filename
///
/// Two-digit years are read as 20xx.
pub fn extract_date_from_name(name: &str) -> Option<NaiveDate> {
    let base = strip_extension(name).replace(|c: char| c == '_' || c == '|', " ");

    for (re, order) in DATE_PATTERNS.iter() {
        for caps in re.captures_iter(&base) {
            let nums: Vec<u32> = (1..=3)
                .filter_map(|i| caps.get(i).and_then(|m| m.as_str().parse().ok()))
                .collect();
            if nums.len() != 3 {
                continue;
            }
            let (year, month, day) = match order {
                DateOrder::DayMonthYear => {
                    let year = if nums[2] < 100 { 2000 + nums[2] } else { nums[2] };
                    (year, nums[1], nums[0])
                }
                DateOrder::YearMonthDay => (nums[0], nums[1], nums[2]),
            };
            if let Some(date) = NaiveDate::from_ymd_opt(year as i32, month, day) {
                return Some(date);
            }
        }
    }
    None
}

/// Meeting identifier: filename stem with separators collapsed to single spaces
pub fn society_from_filename(name: &str) -> String {
    let base = NAME_SEPARATORS.replace_all(strip_extension(name), " ");
    let base = WHITESPACE.replace_all(base.trim(), " ");
    if base.is_empty() {
        UNKNOWN_SOCIETY.to_string()
    } else {
        base.into_owned()
    }
}

/// Model value, then filename keyword, then `"Unknown"`
pub fn meeting_type(config: &AppConfig, analysis: &AiAnalysis, file_name: &str) -> String {
    if let Some(kind) = analysis.meeting_type.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        return kind.to_string();
    }

    let lower = file_name.to_lowercase();
    config
        .meeting_types
        .iter()
        .find(|(keyword, _)| !keyword.trim().is_empty() && lower.contains(&keyword.trim().to_lowercase()))
        .map(|(_, label)| label.clone())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// Whole minutes from store metadata; `"NA"` when unknown or zero
pub fn duration_minutes(duration_ms: Option<u64>) -> String {
    match duration_ms {
        Some(ms) if ms > 0 => millis_to_whole_minutes(ms).to_string(),
        _ => NOT_AVAILABLE.to_string(),
    }
}

/// Checklist coverage summary and missed-item bullets
///
/// Returns `(None, None)` when there is nothing to match against. Missed is
/// None when every feature was covered.
pub fn feature_coverage(
    transcript: &str,
    checklist: &BTreeMap<String, BTreeMap<String, Vec<String>>>,
) -> (Option<String>, Option<String>) {
    let normalized = normalize_text(transcript);
    if normalized.is_empty() || checklist.is_empty() {
        return (None, None);
    }

    let mut summaries = Vec::with_capacity(checklist.len());
    let mut missed_all = BTreeSet::new();

    for (group, features) in checklist {
        let mut covered = BTreeSet::new();
        for (feature, keywords) in features {
            let hit = keywords
                .iter()
                .map(|k| normalize_text(k))
                .any(|k| !k.is_empty() && normalized.contains(&k));
            if hit {
                covered.insert(feature.as_str());
            } else {
                missed_all.insert(feature.as_str());
            }
        }

        let total = features.len();
        let pct = if total == 0 {
            0
        } else {
            (100.0 * covered.len() as f64 / total as f64).round() as u32
        };
        let mut summary = format!("{} Coverage: {}/{} ({}%).", group, covered.len(), total, pct);
        if !covered.is_empty() {
            let list: Vec<&str> = covered.into_iter().collect();
            summary.push_str(&format!(" Covered: {}.", list.join(", ")));
        }
        summaries.push(summary);
    }

    let missed = if missed_all.is_empty() {
        None
    } else {
        let items: Vec<&str> = missed_all.into_iter().collect();
        Some(format!("- {}", items.join("\n- ")))
    };

    (Some(summaries.join(" ")), missed)
}

/// Lowercase, drop punctuation, collapse whitespace
fn normalize_text(s: &str) -> String {
    let stripped = NON_WORD.replace_all(s, "");
    WHITESPACE.replace_all(stripped.to_lowercase().trim(), " ").into_owned()
}

fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}

fn non_empty_or_na(s: &str) -> String {
    let t = s.trim();
    if t.is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        t.to_string()
    }
}
