//! Statement Ledger Library
//!
//! Append-only, hash-chained ledger of public statements with
//! oracle-assisted fact verification and retrieval-backed question
//! answering.
//!
//! ## Modules
//!
//! - [`domain`] - Core domain types (entries, judgments, answers, chat turns)
//! - [`crypto`] - Fingerprint function and chain hashing
//! - [`infra`] - Store traits, PostgreSQL and in-memory adapters, retry, circuit breaker
//! - [`oracle`] - Completion oracle trait and HTTP client
//! - [`ledger`] - Chain linker, verification pipeline, query pipeline
//! - [`metrics`] - Observability and metrics
//! - [`telemetry`] - Logging and OpenTelemetry integration
//! - [`api`] - REST API routes

pub mod api;
pub mod crypto;
pub mod domain;
pub mod infra;
pub mod ledger;
pub mod metrics;
pub mod migrations;
pub mod oracle;
pub mod server;
pub mod telemetry;

// Re-export commonly used types
pub use domain::{
    AnswerConfidence, AskResponse, ChainReport, Confidence, LedgerEntry, NewStatement,
    VerificationReport, VerificationResult, VerificationStatus,
};

pub use infra::{ChatLog, LedgerError, LedgerStore, Result};
