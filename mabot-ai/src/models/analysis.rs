//! Model analysis output and the enriched analysis record
//!
//! [`AiAnalysis`] is the schema-validated shape of the model response. Score
//! fields are mandatory; a response without them (or with non-numeric values)
//! is rejected as a non-retryable analysis error instead of being defaulted.

use crate::error::{truncate_chars, RemoteError};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Placeholder written for values that are absent after enrichment
pub const NOT_AVAILABLE: &str = "NA";

/// Maximum score for each of the five rubric fields
pub const MAX_SCORE: u8 = 10;

/// Column order of the results sheet
pub const RESULT_HEADERS: &[&str] = &[
    "File ID",
    "Date",
    "POC Name",
    "Society Name",
    "Visit Type",
    "Meeting Type",
    "Amount Value",
    "Months",
    "Deal Status",
    "Vendor Leads",
    "Society Leads",
    "Opening Pitch Score",
    "Product Pitch Score",
    "Cross-Sell / Opportunity Handling",
    "Closing Effectiveness",
    "Negotiation Strength",
    "Rebuttal Handling",
    "Overall Sentiment",
    "Total Score",
    "% Score",
    "Risks / Unresolved Issues",
    "Improvements Needed",
    "Owner (Who handled the meeting)",
    "Email Id",
    "Kibana ID",
    "Manager",
    "Product Pitch",
    "Team",
    "City",
    "Media Link",
    "Doc Link",
    "Suggestions & Missed Topics",
    "Pre-meeting brief",
    "Meeting duration (min)",
    "Rapport Building",
    "Improvement Areas",
    "Product Knowledge Displayed",
    "Call Effectiveness and Control",
    "Next Step Clarity and Commitment",
    "Missed Opportunities",
    "Key Discussion Points",
    "Key Questions",
    "Competition Discussion",
    "Action items",
    "Positive Factors",
    "Negative Factors",
    "Customer Needs",
    "Overall Client Sentiment",
    "Feature Checklist Coverage",
    "Manager Email",
];

/// Warehouse column names that the generic normalisation gets wrong
const COLUMN_OVERRIDES: &[(&str, &str)] = &[
    ("% Score", "percent_score"),
    ("Owner (Who handled the meeting)", "owner"),
    ("Call Effectiveness and Control", "call_effectiveness_control"),
    ("Next Step Clarity and Commitment", "next_step_clarity_commitment"),
];

/// The five rubric scores, each 0..=10
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scores {
    pub opening_pitch: u8,
    pub product_pitch: u8,
    pub cross_sell: u8,
    pub closing: u8,
    pub negotiation: u8,
}

impl Scores {
    pub fn total(&self) -> u32 {
        [
            self.opening_pitch,
            self.product_pitch,
            self.cross_sell,
            self.closing,
            self.negotiation,
        ]
        .iter()
        .map(|s| *s as u32)
        .sum()
    }

    /// Total as a percentage of the maximum 50, one decimal place
    pub fn percent(&self) -> String {
        format!("{:.1}%", self.total() as f64 / 50.0 * 100.0)
    }
}

/// Structured model response
#[derive(Debug, Clone, Deserialize)]
pub struct AiAnalysis {
    #[serde(rename = "Opening Pitch Score", deserialize_with = "de_score")]
    pub opening_pitch_score: u8,
    #[serde(rename = "Product Pitch Score", deserialize_with = "de_score")]
    pub product_pitch_score: u8,
    #[serde(rename = "Cross-Sell / Opportunity Handling", deserialize_with = "de_score")]
    pub cross_sell_score: u8,
    #[serde(rename = "Closing Effectiveness", deserialize_with = "de_score")]
    pub closing_score: u8,
    #[serde(rename = "Negotiation Strength", deserialize_with = "de_score")]
    pub negotiation_score: u8,
    #[serde(rename = "Meeting Type", default, deserialize_with = "de_opt_text")]
    pub meeting_type: Option<String>,
    /// Every other field the model returned, keyed by sheet header
    #[serde(flatten)]
    pub details: BTreeMap<String, Value>,
}

impl AiAnalysis {
    /// Parse raw model text into a validated analysis
    ///
    /// Tolerates a surrounding ```json fence. Anything that is not a JSON object
    /// with the mandatory score fields is a NonRetryable error.
    pub fn from_model_text(raw: &str) -> Result<Self, RemoteError> {
        let mut text = raw.trim();
        if let Some(rest) = text.strip_prefix("```json") {
            text = rest;
        } else if let Some(rest) = text.strip_prefix("```") {
            text = rest;
        }
        if let Some(rest) = text.strip_suffix("```") {
            text = rest;
        }
        let text = text.trim();

        if text.is_empty() {
            return Err(RemoteError::non_retryable("empty analysis response"));
        }

        let value: Value = serde_json::from_str(text).map_err(|e| {
            RemoteError::non_retryable(format!(
                "analysis response is not valid JSON ({}): {}",
                e,
                truncate_chars(text, 200)
            ))
        })?;

        if !value.is_object() {
            return Err(RemoteError::non_retryable("analysis output is not a JSON object"));
        }

        serde_json::from_value(value)
            .map_err(|e| RemoteError::non_retryable(format!("analysis response failed validation: {}", e)))
    }

    pub fn scores(&self) -> Scores {
        Scores {
            opening_pitch: self.opening_pitch_score,
            product_pitch: self.product_pitch_score,
            cross_sell: self.cross_sell_score,
            closing: self.closing_score,
            negotiation: self.negotiation_score,
        }
    }

    /// Text value of a detail field, matching the header case-insensitively
    ///
    /// Null, empty and `"NA"` values count as absent.
    pub fn detail_text(&self, header: &str) -> Option<String> {
        let value = self.details.get(header).or_else(|| {
            let wanted = header.trim().to_lowercase();
            self.details
                .iter()
                .find(|(k, _)| k.trim().to_lowercase() == wanted)
                .map(|(_, v)| v)
        })?;
        value_to_text(value).filter(|s| !is_absent(s))
    }
}

/// Enriched, persisted record for one successfully analyzed file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub file_id: String,
    pub file_name: String,
    pub meeting_date: String,
    /// Meeting identifier derived from the filename (society name)
    pub identifier: String,
    pub meeting_type: String,
    pub owner: String,
    pub email: String,
    pub manager: String,
    pub manager_email: String,
    pub team: String,
    pub city: String,
    pub duration_min: String,
    pub scores: Scores,
    pub total_score: u32,
    pub percent_score: String,
    pub feature_coverage: String,
    pub missed_opportunities: String,
    pub media_link: String,
    /// Remaining model fields keyed by sheet header
    pub details: BTreeMap<String, String>,
}

impl AnalysisRecord {
    /// Value for one sheet column; `"NA"` when nothing is known
    pub fn field(&self, header: &str) -> String {
        self.typed_field(header)
            .or_else(|| self.details.get(header).cloned())
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string())
    }

    /// Value of a column backed by a struct field; None for detail columns
    pub(crate) fn typed_field(&self, header: &str) -> Option<String> {
        match header {
            "File ID" => Some(self.file_id.clone()),
            "Date" => Some(self.meeting_date.clone()),
            "Society Name" => Some(self.identifier.clone()),
            "Meeting Type" => Some(self.meeting_type.clone()),
            "Opening Pitch Score" => Some(self.scores.opening_pitch.to_string()),
            "Product Pitch Score" => Some(self.scores.product_pitch.to_string()),
            "Cross-Sell / Opportunity Handling" => Some(self.scores.cross_sell.to_string()),
            "Closing Effectiveness" => Some(self.scores.closing.to_string()),
            "Negotiation Strength" => Some(self.scores.negotiation.to_string()),
            "Total Score" => Some(self.total_score.to_string()),
            "% Score" => Some(self.percent_score.clone()),
            "Owner (Who handled the meeting)" => Some(self.owner.clone()),
            "Email Id" => Some(self.email.clone()),
            "Manager" => Some(self.manager.clone()),
            "Manager Email" => Some(self.manager_email.clone()),
            "Team" => Some(self.team.clone()),
            "City" => Some(self.city.clone()),
            "Media Link" => Some(self.media_link.clone()),
            "Meeting duration (min)" => Some(self.duration_min.clone()),
            "Feature Checklist Coverage" => Some(self.feature_coverage.clone()),
            "Missed Opportunities" => Some(self.missed_opportunities.clone()),
            _ => None,
        }
    }

    /// Values in [`RESULT_HEADERS`] order
    pub fn to_sheet_row(&self) -> Vec<String> {
        RESULT_HEADERS.iter().map(|h| self.field(h)).collect()
    }

    /// Warehouse row keyed by normalized column names
    pub fn to_warehouse_row(&self) -> BTreeMap<String, String> {
        RESULT_HEADERS
            .iter()
            .map(|h| (normalize_column_name(h), self.field(h)))
            .collect()
    }
}

/// Convert a sheet header into a warehouse-safe snake_case column name
pub fn normalize_column_name(header: &str) -> String {
    if let Some((_, name)) = COLUMN_OVERRIDES.iter().find(|(h, _)| *h == header) {
        return name.to_string();
    }

    let mut out = String::with_capacity(header.len());
    for ch in header.trim().to_lowercase().chars() {
        if ch.is_alphanumeric() {
            out.push(ch);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        header.trim().replace(' ', "_").to_lowercase()
    } else {
        trimmed.to_string()
    }
}

fn is_absent(s: &str) -> bool {
    let t = s.trim();
    t.is_empty() || t.eq_ignore_ascii_case(NOT_AVAILABLE) || t.eq_ignore_ascii_case("N/A")
}

/// Render a JSON value as sheet text
pub(crate) fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.trim().to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(value_to_text).filter(|s| !s.is_empty()).collect();
            if parts.is_empty() {
                None
            } else {
                Some(format!("- {}", parts.join("\n- ")))
            }
        }
        Value::Object(_) => Some(value.to_string()),
    }
}

fn de_score<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value = Value::deserialize(deserializer)?;
    let parsed = match &value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => {
            let s = s.trim();
            let s = s.strip_suffix("/10").unwrap_or(s).trim();
            s.parse::<u64>().ok()
        }
        _ => None,
    };

    match parsed {
        Some(n) if n <= MAX_SCORE as u64 => Ok(n as u8),
        _ => Err(D::Error::custom(format!("invalid score value: {}", value))),
    }
}

fn de_opt_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_to_text).filter(|s| !is_absent(s)))
}
