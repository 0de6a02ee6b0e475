//! Chain integrity reports.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a chain walk stopped before reaching the genesis sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ChainBreakReason {
    /// Stored statement fingerprint does not match its content fields
    StatementFingerprintMismatch,
    /// Stored block fingerprint does not match its inputs
    BlockFingerprintMismatch,
    /// `previous_hash` points at no stored entry
    DanglingLink { previous_hash: String },
    /// Height does not decrease by one along the walk
    HeightMismatch { expected: u64, actual: u64 },
    /// The walk revisited an entry or exceeded the tail height
    Cycle,
}

/// First broken link found while walking the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainBreak {
    pub entry_id: Uuid,
    pub reason: ChainBreakReason,
}

/// Result of walking the chain from the tail back to genesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainReport {
    pub valid: bool,
    /// Number of entries visited.
    pub length: u64,
    /// Block fingerprint of the tail, if the ledger is non-empty.
    pub tail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broken_at: Option<ChainBreak>,
}

impl ChainReport {
    pub fn empty() -> Self {
        Self {
            valid: true,
            length: 0,
            tail: None,
            broken_at: None,
        }
    }
}
