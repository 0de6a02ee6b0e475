//! Domain models for the statement ledger
//!
//! Ledger entries, verification judgments, answers, and chat turns.

mod answer;
mod chain;
mod chat;
mod entry;
mod types;
mod verification;

pub use answer::*;
pub use chain::*;
pub use chat::*;
pub use entry::*;
pub use types::*;
pub use verification::*;
