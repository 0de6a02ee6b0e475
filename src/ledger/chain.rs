//! Chain linker
//!
//! Appends statements to the hash chain and audits it.
//!
//! # Append protocol
//!
//! 1. Read the tail.
//! 2. Seal the candidate onto it (`previous_hash` = tail's block fingerprint).
//! 3. Ask the store to insert iff that tail is still the tail.
//! 4. If another append won the race, back off and start over from 1.
//!
//! No in-process lock is taken; the store's compare-and-swap is the only
//! serialization point, so several linkers may share one store.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::domain::{ChainBreak, ChainBreakReason, ChainReport, LedgerEntry, NewStatement};
use crate::infra::{AppendOutcome, LedgerError, LedgerStore, Result, RetryConfig};
use crate::metrics::{metric_names, timed, MetricsRegistry};

/// Serializes appends onto the ledger tail.
pub struct ChainLinker {
    store: Arc<dyn LedgerStore>,
    retry: RetryConfig,
    metrics: Arc<MetricsRegistry>,
}

impl ChainLinker {
    pub fn new(store: Arc<dyn LedgerStore>, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            store,
            retry: RetryConfig::chain_append(),
            metrics,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Validate `candidate` and append it as the new tail.
    #[instrument(skip(self, candidate), fields(speaker = %candidate.speaker))]
    pub async fn append(&self, candidate: NewStatement) -> Result<LedgerEntry> {
        if let Err(e) = candidate.validate() {
            self.metrics
                .inc_counter(metric_names::VALIDATION_ERRORS)
                .await;
            return Err(e);
        }

        let result = timed(
            &self.metrics,
            metric_names::APPEND_LATENCY,
            self.append_with_retry(&candidate),
        )
        .await;

        match &result {
            Ok(entry) => {
                self.metrics
                    .inc_counter(metric_names::ENTRIES_APPENDED)
                    .await;
                self.metrics
                    .set_gauge(metric_names::CHAIN_HEIGHT, entry.height)
                    .await;
                info!(
                    entry_id = %entry.id,
                    height = entry.height,
                    block_fingerprint = %entry.block_fingerprint,
                    "Statement appended"
                );
            }
            Err(e) if e.is_store_error() => {
                self.metrics.inc_counter(metric_names::STORE_ERRORS).await;
            }
            Err(_) => {}
        }

        result
    }

    async fn append_with_retry(&self, candidate: &NewStatement) -> Result<LedgerEntry> {
        let attempts = self.retry.max_attempts();

        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(self.retry.delay_before(attempt)).await;
            }

            let tail = self.store.latest_entry().await?;
            let entry = LedgerEntry::seal(candidate, tail.as_ref(), Utc::now());

            match self.store.append_entry(&entry).await? {
                AppendOutcome::Appended => return Ok(entry),
                AppendOutcome::TailMoved => {
                    self.metrics
                        .inc_counter(metric_names::APPEND_CONFLICTS)
                        .await;
                    debug!(
                        attempt = attempt + 1,
                        previous_hash = %entry.previous_hash,
                        "Tail moved during append"
                    );
                }
            }
        }

        self.metrics
            .inc_counter(metric_names::APPEND_CONFLICTS_EXHAUSTED)
            .await;
        warn!(attempts, "Append gave up after repeated tail conflicts");
        Err(LedgerError::ChainConflict { attempts })
    }

    /// Current tail, if any.
    pub async fn tail(&self) -> Result<Option<LedgerEntry>> {
        self.store.latest_entry().await
    }

    /// Walk from the tail back to the genesis sentinel, recomputing every
    /// fingerprint on the way.
    #[instrument(skip(self))]
    pub async fn verify_chain(&self) -> Result<ChainReport> {
        let Some(tail) = self.store.latest_entry().await? else {
            return Ok(ChainReport::empty());
        };

        let tail_fingerprint = tail.block_fingerprint.clone();
        let tail_height = tail.height;
        let mut seen = HashSet::new();
        let mut length = 0u64;
        let mut expected_height = tail_height;
        let mut current = tail;

        let broken_at = loop {
            length += 1;

            if let Some(reason) = link_fault(&current, expected_height, &mut seen) {
                break Some(ChainBreak {
                    entry_id: current.id,
                    reason,
                });
            }

            if current.is_genesis() {
                break None;
            }

            match self
                .store
                .get_by_block_fingerprint(&current.previous_hash)
                .await?
            {
                Some(previous) => {
                    current = previous;
                    expected_height = expected_height.saturating_sub(1);
                }
                None => {
                    break Some(ChainBreak {
                        entry_id: current.id,
                        reason: ChainBreakReason::DanglingLink {
                            previous_hash: current.previous_hash.clone(),
                        },
                    });
                }
            }
        };

        self.metrics
            .set_gauge(metric_names::CHAIN_HEIGHT, tail_height)
            .await;

        let report = ChainReport {
            valid: broken_at.is_none(),
            length,
            tail: Some(tail_fingerprint),
            broken_at,
        };

        match &report.broken_at {
            None => info!(length, "Chain verified"),
            Some(brk) => warn!(entry_id = %brk.entry_id, reason = ?brk.reason, "Chain broken"),
        }

        Ok(report)
    }
}

/// First integrity fault of a single link, if any.
fn link_fault(
    entry: &LedgerEntry,
    expected_height: u64,
    seen: &mut HashSet<uuid::Uuid>,
) -> Option<ChainBreakReason> {
    if !seen.insert(entry.id) {
        return Some(ChainBreakReason::Cycle);
    }

    if entry.height != expected_height {
        return Some(ChainBreakReason::HeightMismatch {
            expected: expected_height,
            actual: entry.height,
        });
    }
    if entry.is_genesis() && entry.height != 1 {
        return Some(ChainBreakReason::HeightMismatch {
            expected: 1,
            actual: entry.height,
        });
    }

    if entry.statement_fingerprint != entry.recompute_statement_fingerprint() {
        return Some(ChainBreakReason::StatementFingerprintMismatch);
    }
    if entry.block_fingerprint != entry.recompute_block_fingerprint() {
        return Some(ChainBreakReason::BlockFingerprintMismatch);
    }
    None
}
