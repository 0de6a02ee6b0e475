//! PostgreSQL implementations of the ledger store and chat log

mod chat_log;
mod ledger_store;

pub use chat_log::*;
pub use ledger_store::*;
