//! Completion oracle
//!
//! The oracle is an external text-completion service. Everything it returns
//! is untrusted: callers parse its content defensively and decide whether a
//! failure is fatal or a downgrade.

mod error;
mod http;

pub use error::OracleError;
pub use http::{extract_message_content, HttpOracle, OracleConfig};

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::infra::CircuitState;

/// One prompt for the oracle.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Instruction framing the task
    pub system: String,
    /// The task itself
    pub prompt: String,
    /// Sampling temperature; near zero for judgments
    pub temperature: f32,
    /// Output length budget
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            temperature: 0.1,
            max_tokens: 1000,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// A text-completion service.
///
/// Implementations must not retry on their own: each call may be billed.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CompletionOracle: Send + Sync {
    /// Return the text content of the completion.
    async fn complete(&self, request: CompletionRequest) -> Result<String, OracleError>;

    /// State of the breaker guarding this oracle, if it has one
    async fn circuit_state(&self) -> Option<CircuitState> {
        None
    }
}
