//! Shared request and response types for REST API handlers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{ChatTurn, LedgerEntry, NewStatement};
use crate::ledger::Claim;

/// Default page size for `GET /statements`.
pub const DEFAULT_LIST_LIMIT: usize = 20;

/// Largest page `GET /statements` will return.
pub const MAX_LIST_LIMIT: usize = 100;

/// Default number of turns returned by `GET /chat/:session_id`.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Largest number of turns `GET /chat/:session_id` will return.
pub const MAX_HISTORY_LIMIT: usize = 500;

// ============================================================================
// Statements
// ============================================================================

/// Request body for `POST /statements`.
pub type AppendRequest = NewStatement;

/// Response for a successful append.
#[derive(Debug, Serialize, Deserialize)]
pub struct AppendResponse {
    pub success: bool,
    pub entry: LedgerEntry,
}

impl AppendResponse {
    pub fn new(entry: LedgerEntry) -> Self {
        Self {
            success: true,
            entry,
        }
    }
}

/// Query parameters for listing recent statements.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

impl ListQuery {
    /// Requested limit, defaulted and capped.
    pub fn effective_limit(&self, default: usize, max: usize) -> usize {
        self.limit.unwrap_or(default).min(max)
    }
}

/// Response for `GET /statements`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatementsResponse {
    pub entries: Vec<LedgerEntry>,
    pub count: usize,
}

// ============================================================================
// Verification
// ============================================================================

/// Request body for `POST /verify`.
///
/// A body carrying `statementId` verifies a stored entry; anything else is
/// read as an ad hoc claim.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum VerifyRequest {
    Stored(StoredStatementRef),
    AdHoc(Claim),
}

/// Reference to an entry already on the ledger.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredStatementRef {
    pub statement_id: Uuid,
}

// ============================================================================
// Ask
// ============================================================================

/// Request body for `POST /ask`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskRequest {
    pub query: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl AskRequest {
    /// Session id with blank values treated as absent.
    pub fn session(&self) -> Option<&str> {
        self.session_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

// ============================================================================
// Chat
// ============================================================================

/// Response for `GET /chat/:session_id`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistoryResponse {
    pub session_id: String,
    pub turns: Vec<ChatTurn>,
    pub count: usize,
}

/// Response for `DELETE /chat/:session_id`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeResponse {
    pub session_id: String,
    pub deleted: u64,
}
