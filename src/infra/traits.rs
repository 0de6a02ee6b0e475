//! Trait definitions for the ledger's persistent collaborators

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use uuid::Uuid;

use crate::domain::{ChatTurn, Confidence, LedgerEntry, VerificationStatus};

use super::Result;

/// Outcome of a compare-and-swap append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The entry was inserted; its `previous_hash` was the tail.
    Appended,
    /// Another entry already claims `previous_hash`; nothing was written.
    TailMoved,
}

/// Ledger store holds the hash-chained statement entries.
///
/// Invariant: at most one entry claims any given `previous_hash`, so the
/// stored chain is linear.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert `entry` iff its `previous_hash` is still the tail's block
    /// fingerprint (or the genesis sentinel on an empty ledger).
    ///
    /// A single insert is atomic; readers never observe a partial row.
    async fn append_entry(&self, entry: &LedgerEntry) -> Result<AppendOutcome>;

    /// Current tail (highest entry), if any
    async fn latest_entry(&self) -> Result<Option<LedgerEntry>>;

    /// Read entry by ID
    async fn get_by_id(&self, id: Uuid) -> Result<Option<LedgerEntry>>;

    /// Read entry by its block fingerprint (used when walking the chain)
    async fn get_by_block_fingerprint(&self, fingerprint: &str) -> Result<Option<LedgerEntry>>;

    /// Full-text search over statement content, best matches first
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<LedgerEntry>>;

    /// Case-insensitive substring match of any keyword against statements
    async fn keyword_search(&self, keywords: &[String], limit: usize) -> Result<Vec<LedgerEntry>>;

    /// Most recent entries, newest first
    async fn recent(&self, limit: usize) -> Result<Vec<LedgerEntry>>;

    /// Record a verification judgment on an entry that has none yet.
    ///
    /// Returns false when the entry is missing or already verified.
    async fn record_verification(
        &self,
        id: Uuid,
        status: VerificationStatus,
        confidence: Confidence,
    ) -> Result<bool>;

    /// Reachability probe for readiness checks
    async fn health(&self) -> ComponentHealth {
        match self.latest_entry().await {
            Ok(_) => ComponentHealth::Healthy,
            Err(e) => ComponentHealth::Unhealthy {
                reason: e.to_string(),
            },
        }
    }
}

/// Chat log stores question/answer turns per session.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChatLog: Send + Sync {
    /// Insert a turn
    async fn append_turn(&self, turn: &ChatTurn) -> Result<()>;

    /// Turns of a session, oldest first
    async fn session_history(&self, session_id: &str, limit: usize) -> Result<Vec<ChatTurn>>;

    /// Delete every turn of a session; returns the number removed
    async fn purge_session(&self, session_id: &str) -> Result<u64>;
}

/// Health of an individual component
#[derive(Debug, Clone)]
pub enum ComponentHealth {
    Healthy,
    Degraded { reason: String },
    Unhealthy { reason: String },
}
