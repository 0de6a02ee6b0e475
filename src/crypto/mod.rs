//! Cryptographic utilities for the statement ledger
//!
//! Provides:
//! - Deterministic SHA-256 fingerprints over ordered string parts
//! - Statement and block fingerprints with domain separation

mod hash;

pub use hash::*;
