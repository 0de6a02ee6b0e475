//! Error types for the statement ledger

use thiserror::Error;
use uuid::Uuid;

use crate::oracle::OracleError;

/// Errors that can occur in the ledger services
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Caller input rejected
    #[error("validation error: {0}")]
    Validation(String),

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Non-database store failure
    #[error("store error: {0}")]
    Store(String),

    /// Ledger entry not found
    #[error("entry not found: {0}")]
    EntryNotFound(Uuid),

    /// The tail kept moving under concurrent appends
    #[error("chain conflict: tail moved on {attempts} consecutive append attempts")]
    ChainConflict { attempts: u32 },

    /// Completion oracle failure
    #[error("oracle error: {0}")]
    Oracle(#[from] OracleError),

    /// No completion oracle is configured
    #[error("completion oracle is not configured")]
    OracleNotConfigured,

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// True for failures of the persistent store.
    pub fn is_store_error(&self) -> bool {
        matches!(self, LedgerError::Database(_) | LedgerError::Store(_))
    }
}

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;
