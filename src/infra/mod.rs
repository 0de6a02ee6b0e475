//! Infrastructure layer for the statement ledger
//!
//! Contains trait definitions and implementations for:
//! - Ledger storage (PostgreSQL, in-memory)
//! - Chat log storage (PostgreSQL, in-memory)
//! - Append retry policy (compare-and-swap contention)
//! - Circuit breaker (oracle protection)

mod circuit_breaker;
mod error;
mod memory;
pub mod postgres;
mod retry;
mod traits;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};
pub use error::*;
pub use memory::{InMemoryChatLog, InMemoryLedgerStore};
pub use postgres::{PgChatLog, PgLedgerStore};
pub use retry::RetryConfig;
pub use traits::*;
