//! Ledger entries and the statements they are built from.
//!
//! A `LedgerEntry` is immutable once appended, except for the two
//! verification fields, which are set at most once afterwards. Those fields
//! are not part of any fingerprint input, so recording a verification never
//! invalidates the chain.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::{block_fingerprint, statement_fingerprint, GENESIS_HASH};
use crate::infra::{LedgerError, Result};

use super::{Confidence, VerificationStatus};

/// Maximum accepted statement length, in characters.
pub const MAX_STATEMENT_CHARS: usize = 10_000;

/// Maximum accepted speaker length, in characters.
pub const MAX_SPEAKER_CHARS: usize = 256;

/// A statement submitted for appending to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStatement {
    pub statement: String,
    pub speaker: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement_date: Option<NaiveDate>,
}

impl NewStatement {
    pub fn new(statement: impl Into<String>, speaker: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            speaker: speaker.into(),
            source_url: None,
            statement_date: None,
        }
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    pub fn with_statement_date(mut self, date: NaiveDate) -> Self {
        self.statement_date = Some(date);
        self
    }

    /// Reject blank or oversized fields.
    pub fn validate(&self) -> Result<()> {
        if self.statement.trim().is_empty() {
            return Err(LedgerError::Validation(
                "statement must not be empty".to_string(),
            ));
        }
        if self.statement.chars().count() > MAX_STATEMENT_CHARS {
            return Err(LedgerError::Validation(format!(
                "statement must be at most {MAX_STATEMENT_CHARS} characters"
            )));
        }
        if self.speaker.trim().is_empty() {
            return Err(LedgerError::Validation(
                "speaker must not be empty".to_string(),
            ));
        }
        if self.speaker.chars().count() > MAX_SPEAKER_CHARS {
            return Err(LedgerError::Validation(format!(
                "speaker must be at most {MAX_SPEAKER_CHARS} characters"
            )));
        }
        Ok(())
    }

    /// Source URL with blank values treated as absent.
    pub fn normalized_source_url(&self) -> Option<String> {
        self.source_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

/// One append-only record in the hash chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: Uuid,

    /// Position in the chain; the genesis entry has height 1.
    pub height: u64,

    pub statement: String,
    pub speaker: String,
    pub source_url: Option<String>,
    pub statement_date: Option<NaiveDate>,

    /// Digest of (statement, speaker, source_url)
    pub statement_fingerprint: String,

    /// `block_fingerprint` of the tail at append time, or `"0"` for genesis
    pub previous_hash: String,

    /// Digest of (statement_fingerprint, previous_hash, created_at millis)
    pub block_fingerprint: String,

    pub verification_status: Option<VerificationStatus>,
    pub verification_confidence: Option<Confidence>,

    /// Append timestamp, millisecond precision. Part of the block fingerprint.
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Seal a validated statement onto the given tail.
    ///
    /// `now` is truncated to milliseconds so the stored timestamp reproduces
    /// the block fingerprint input exactly.
    pub fn seal(candidate: &NewStatement, tail: Option<&LedgerEntry>, now: DateTime<Utc>) -> Self {
        let appended_at = truncate_to_millis(now);
        let source_url = candidate.normalized_source_url();

        let (previous_hash, height) = match tail {
            Some(tail) => (tail.block_fingerprint.clone(), tail.height + 1),
            None => (GENESIS_HASH.to_string(), 1),
        };

        let statement_fp = statement_fingerprint(
            &candidate.statement,
            &candidate.speaker,
            source_url.as_deref(),
        );
        let block_fp = block_fingerprint(
            &statement_fp,
            &previous_hash,
            appended_at.timestamp_millis(),
        );

        Self {
            id: Uuid::new_v4(),
            height,
            statement: candidate.statement.clone(),
            speaker: candidate.speaker.clone(),
            source_url,
            statement_date: candidate.statement_date,
            statement_fingerprint: statement_fp,
            previous_hash,
            block_fingerprint: block_fp,
            verification_status: None,
            verification_confidence: None,
            created_at: appended_at,
            updated_at: appended_at,
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.previous_hash == GENESIS_HASH
    }

    pub fn is_verified(&self) -> bool {
        self.verification_status.is_some()
    }

    /// Recompute the statement fingerprint from the stored content fields.
    pub fn recompute_statement_fingerprint(&self) -> String {
        statement_fingerprint(&self.statement, &self.speaker, self.source_url.as_deref())
    }

    /// Recompute the block fingerprint from the stored inputs.
    pub fn recompute_block_fingerprint(&self) -> String {
        block_fingerprint(
            &self.statement_fingerprint,
            &self.previous_hash,
            self.created_at.timestamp_millis(),
        )
    }

    /// Both stored fingerprints match their recomputed values.
    pub fn verify_fingerprints(&self) -> bool {
        self.statement_fingerprint == self.recompute_statement_fingerprint()
            && self.block_fingerprint == self.recompute_block_fingerprint()
    }

    pub fn summary(&self) -> SourceSummary {
        SourceSummary {
            id: self.id,
            statement: self.statement.clone(),
            speaker: self.speaker.clone(),
            date: self.statement_date,
            source_url: self.source_url.clone(),
            block_fingerprint: self.block_fingerprint.clone(),
        }
    }
}

/// Compact reference to a ledger entry, as returned alongside answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSummary {
    pub id: Uuid,
    pub statement: String,
    pub speaker: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub block_fingerprint: String,
}

/// Drop sub-millisecond precision from a timestamp.
pub fn truncate_to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ts.timestamp_millis())
        .single()
        .unwrap_or(ts)
}
