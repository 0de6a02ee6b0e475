//! Verification judgments returned by the completion oracle.
//!
//! Oracle output is untrusted text that is expected to usually be a JSON
//! object. Parsing never fails: anything unusable becomes a
//! [`Judgment::Degraded`] carrying safe defaults and the raw text.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{Confidence, VerificationStatus};

/// Issue reported when the oracle content could not be used at all.
pub const PARSE_FAILURE_ISSUE: &str = "AI response parsing failed";

/// Placeholder for free-text fields the oracle left out.
pub const NOT_PROVIDED: &str = "Not provided";

/// Keys the oracle is asked to return.
pub const JUDGMENT_KEYS: [&str; 7] = [
    "status",
    "confidence",
    "keyFacts",
    "issues",
    "context",
    "recommendation",
    "reasoning",
];

/// Structured verification judgment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub status: VerificationStatus,
    pub confidence: Confidence,
    pub key_facts: Vec<String>,
    pub issues: Vec<String>,
    pub context: String,
    pub recommendation: String,
    pub reasoning: String,
}

impl VerificationResult {
    /// Result synthesized when the oracle content is unusable.
    pub fn degraded(raw: &str) -> Self {
        Self {
            status: VerificationStatus::Unverified,
            confidence: Confidence::Low,
            key_facts: Vec::new(),
            issues: vec![PARSE_FAILURE_ISSUE.to_string()],
            context: String::new(),
            recommendation: NOT_PROVIDED.to_string(),
            reasoning: raw.to_string(),
        }
    }

    fn from_object(obj: &Map<String, Value>) -> Self {
        Self {
            status: obj
                .get("status")
                .and_then(Value::as_str)
                .and_then(VerificationStatus::parse)
                .unwrap_or_default(),
            confidence: obj
                .get("confidence")
                .and_then(Value::as_str)
                .and_then(Confidence::parse)
                .unwrap_or_default(),
            key_facts: string_list(obj.get("keyFacts")),
            issues: string_list(obj.get("issues")),
            context: text_field(obj.get("context")).unwrap_or_default(),
            recommendation: text_field(obj.get("recommendation"))
                .unwrap_or_else(|| NOT_PROVIDED.to_string()),
            reasoning: text_field(obj.get("reasoning"))
                .unwrap_or_else(|| NOT_PROVIDED.to_string()),
        }
    }
}

/// Parsed oracle judgment, tagged by how much of it was usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Judgment {
    /// The content was a JSON object with at least one expected key.
    Parsed(VerificationResult),
    /// The content was unusable; defaults plus the raw text.
    Degraded {
        result: VerificationResult,
        raw: String,
    },
}

impl Judgment {
    /// Parse oracle content defensively.
    pub fn parse(content: &str) -> Self {
        let body = strip_code_fence(content);

        let obj = match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(obj)) => obj,
            _ => return Self::degrade(content),
        };

        if !JUDGMENT_KEYS.iter().any(|key| obj.contains_key(*key)) {
            return Self::degrade(content);
        }

        Judgment::Parsed(VerificationResult::from_object(&obj))
    }

    fn degrade(raw: &str) -> Self {
        Judgment::Degraded {
            result: VerificationResult::degraded(raw),
            raw: raw.to_string(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Judgment::Degraded { .. })
    }

    /// Unusable oracle text, if parsing degraded.
    pub fn raw(&self) -> Option<&str> {
        match self {
            Judgment::Parsed(_) => None,
            Judgment::Degraded { raw, .. } => Some(raw),
        }
    }

    pub fn result(&self) -> &VerificationResult {
        match self {
            Judgment::Parsed(result) => result,
            Judgment::Degraded { result, .. } => result,
        }
    }

    pub fn into_result(self) -> VerificationResult {
        match self {
            Judgment::Parsed(result) => result,
            Judgment::Degraded { result, .. } => result,
        }
    }
}

/// Full response of a verification request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement_id: Option<Uuid>,
    pub statement: String,
    pub speaker: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement_date: Option<NaiveDate>,
    pub verification: VerificationResult,
    /// True when the oracle content could not be parsed.
    pub degraded: bool,
    /// True when the judgment was written back onto the ledger entry.
    pub persisted: bool,
    pub timestamp: DateTime<Utc>,
}

/// Strip a surrounding Markdown code fence (```json ... ```), if present.
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(rest) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening line.
    match rest.find('\n') {
        Some(idx) => rest[idx + 1..].trim(),
        None => rest.trim(),
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn text_field(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    }
}
