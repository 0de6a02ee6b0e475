//! Core enumerations shared by the ledger, verification, and query layers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of an oracle verification judgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Verified,
    Unverified,
    Disputed,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Verified => "VERIFIED",
            VerificationStatus::Unverified => "UNVERIFIED",
            VerificationStatus::Disputed => "DISPUTED",
        }
    }

    /// Parse case-insensitively; surrounding whitespace is ignored.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "VERIFIED" => Some(VerificationStatus::Verified),
            "UNVERIFIED" => Some(VerificationStatus::Unverified),
            "DISPUTED" => Some(VerificationStatus::Disputed),
            _ => None,
        }
    }
}

impl Default for VerificationStatus {
    fn default() -> Self {
        VerificationStatus::Unverified
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Confidence attached to a verification judgment.
///
/// Ordered from least to most confident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "LOW",
            Confidence::Medium => "MEDIUM",
            Confidence::High => "HIGH",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Some(Confidence::Low),
            "MEDIUM" => Some(Confidence::Medium),
            "HIGH" => Some(Confidence::High),
            _ => None,
        }
    }
}

impl Default for Confidence {
    fn default() -> Self {
        Confidence::Low
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Confidence of an `ask` answer. Serialized lowercase on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerConfidence {
    Low,
    Medium,
    High,
}

impl AnswerConfidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerConfidence::Low => "low",
            AnswerConfidence::Medium => "medium",
            AnswerConfidence::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(AnswerConfidence::Low),
            "medium" => Some(AnswerConfidence::Medium),
            "high" => Some(AnswerConfidence::High),
            _ => None,
        }
    }
}

impl fmt::Display for AnswerConfidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_is_case_insensitive() {
        assert_eq!(
            VerificationStatus::parse(" verified "),
            Some(VerificationStatus::Verified)
        );
        assert_eq!(
            VerificationStatus::parse("Disputed"),
            Some(VerificationStatus::Disputed)
        );
        assert_eq!(VerificationStatus::parse("maybe"), None);
    }

    #[test]
    fn test_confidence_ordering_and_default() {
        assert!(Confidence::Low < Confidence::Medium);
        assert!(Confidence::Medium < Confidence::High);
        assert_eq!(Confidence::default(), Confidence::Low);
    }

    #[test]
    fn test_wire_casing() {
        assert_eq!(
            serde_json::to_string(&VerificationStatus::Unverified).unwrap(),
            "\"UNVERIFIED\""
        );
        assert_eq!(serde_json::to_string(&Confidence::High).unwrap(), "\"HIGH\"");
        assert_eq!(
            serde_json::to_string(&AnswerConfidence::Medium).unwrap(),
            "\"medium\""
        );
    }
}
