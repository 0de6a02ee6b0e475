//! Verification pipeline
//!
//! Sends one statement to the completion oracle and turns whatever comes back
//! into a [`VerificationResult`]. Transport and envelope failures are
//! surfaced; unusable content is not (see [`Judgment`]).

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::domain::{Judgment, LedgerEntry, VerificationReport, MAX_STATEMENT_CHARS};
use crate::infra::{LedgerError, LedgerStore, Result};
use crate::metrics::{metric_names, MetricsRegistry};
use crate::oracle::{CompletionOracle, CompletionRequest};

/// Speaker shown to the oracle when an ad hoc claim has none.
pub const UNKNOWN_SPEAKER: &str = "Unknown";

const VERIFY_TEMPERATURE: f32 = 0.1;
const VERIFY_MAX_TOKENS: u32 = 1000;
const RAW_PREVIEW_CHARS: usize = 200;

const VERIFY_SYSTEM_PROMPT: &str = "You are a careful, impartial fact-checker. \
You assess public statements against well-established facts and respond only with JSON.";

/// A statement to verify that is not (necessarily) on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    pub statement: String,
    #[serde(default)]
    pub speaker: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub statement_date: Option<NaiveDate>,
}

impl Claim {
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            speaker: None,
            source_url: None,
            statement_date: None,
        }
    }

    pub fn with_speaker(mut self, speaker: impl Into<String>) -> Self {
        self.speaker = Some(speaker.into());
        self
    }

    fn validate(&self) -> Result<()> {
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
        Ok(())
    }

    fn speaker_or_unknown(&self) -> &str {
        self.speaker
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN_SPEAKER)
    }

    fn source_url(&self) -> Option<&str> {
        self.source_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

impl From<&LedgerEntry> for Claim {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            statement: entry.statement.clone(),
            speaker: Some(entry.speaker.clone()),
            source_url: entry.source_url.clone(),
            statement_date: entry.statement_date,
        }
    }
}

/// Asks the oracle for verification judgments.
pub struct VerificationPipeline {
    store: Arc<dyn LedgerStore>,
    oracle: Option<Arc<dyn CompletionOracle>>,
    metrics: Arc<MetricsRegistry>,
}

impl VerificationPipeline {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        oracle: Option<Arc<dyn CompletionOracle>>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            store,
            oracle,
            metrics,
        }
    }

    /// Verify an ad hoc statement. Nothing is persisted.
    #[instrument(skip(self, claim))]
    pub async fn verify(&self, claim: &Claim) -> Result<VerificationReport> {
        if let Err(e) = claim.validate() {
            self.metrics
                .inc_counter(metric_names::VALIDATION_ERRORS)
                .await;
            return Err(e);
        }

        let judgment = self.judge(claim).await?;
        Ok(report(None, claim, judgment, false))
    }

    /// Verify a ledger entry and record the judgment on it, best-effort.
    #[instrument(skip(self))]
    pub async fn verify_entry(&self, id: Uuid) -> Result<VerificationReport> {
        let entry = self
            .store
            .get_by_id(id)
            .await?
            .ok_or(LedgerError::EntryNotFound(id))?;

        let claim = Claim::from(&entry);
        let judgment = self.judge(&claim).await?;

        // Degraded judgments carry placeholders, not a verdict
        let persisted = if judgment.is_degraded() {
            false
        } else {
            self.persist(&entry, &judgment).await
        };

        Ok(report(Some(entry.id), &claim, judgment, persisted))
    }

    async fn judge(&self, claim: &Claim) -> Result<Judgment> {
        let oracle = self.oracle.as_ref().ok_or(LedgerError::OracleNotConfigured)?;

        let request = CompletionRequest::new(VERIFY_SYSTEM_PROMPT, verification_prompt(claim))
            .with_temperature(VERIFY_TEMPERATURE)
            .with_max_tokens(VERIFY_MAX_TOKENS);

        let content = match oracle.complete(request).await {
            Ok(content) => content,
            Err(e) => {
                self.metrics.inc_counter(metric_names::ORACLE_FAILURES).await;
                warn!(error = %e, "Verification oracle call failed");
                return Err(e.into());
            }
        };

        let judgment = Judgment::parse(&content);
        self.metrics
            .inc_counter(metric_names::VERIFICATIONS_COMPLETED)
            .await;
        if judgment.is_degraded() {
            self.metrics
                .inc_counter(metric_names::VERIFICATIONS_DEGRADED)
                .await;
            let preview: String = judgment
                .raw()
                .unwrap_or_default()
                .chars()
                .take(RAW_PREVIEW_CHARS)
                .collect();
            warn!(chars = content.len(), %preview, "Oracle judgment was not usable JSON");
        }
        Ok(judgment)
    }

    async fn persist(&self, entry: &LedgerEntry, judgment: &Judgment) -> bool {
        let result = judgment.result();
        match self
            .store
            .record_verification(entry.id, result.status, result.confidence)
            .await
        {
            Ok(true) => true,
            Ok(false) => {
                debug!(entry_id = %entry.id, "Entry already carries a verification");
                false
            }
            Err(e) => {
                self.metrics.inc_counter(metric_names::STORE_ERRORS).await;
                warn!(entry_id = %entry.id, error = %e, "Failed to record verification");
                false
            }
        }
    }
}

fn report(
    statement_id: Option<Uuid>,
    claim: &Claim,
    judgment: Judgment,
    persisted: bool,
) -> VerificationReport {
    VerificationReport {
        statement_id,
        statement: claim.statement.clone(),
        speaker: claim.speaker_or_unknown().to_string(),
        source_url: claim.source_url().map(str::to_string),
        statement_date: claim.statement_date,
        degraded: judgment.is_degraded(),
        verification: judgment.into_result(),
        persisted,
        timestamp: Utc::now(),
    }
}

fn verification_prompt(claim: &Claim) -> String {
    let date = claim
        .statement_date
        .map(|d| d.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    format!(
        r#"Assess the following statement.

Statement: "{statement}"
Speaker: {speaker}
Source: {source}
Date: {date}

Respond with a single JSON object and nothing else, using exactly these keys:
{{
  "status": "VERIFIED" | "UNVERIFIED" | "DISPUTED",
  "confidence": "LOW" | "MEDIUM" | "HIGH",
  "keyFacts": [string, ...],
  "issues": [string, ...],
  "context": string,
  "recommendation": string,
  "reasoning": string
}}"#,
        statement = claim.statement.trim(),
        speaker = claim.speaker_or_unknown(),
        source = claim.source_url().unwrap_or("not provided"),
    )
}
