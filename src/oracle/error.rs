//! Completion oracle failures

use thiserror::Error;

/// Ways a completion oracle call can fail.
///
/// Content that arrives but is not the expected JSON judgment is not an
/// error; see [`crate::domain::Judgment`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// Transport failure, timeout, or an open circuit
    #[error("oracle unavailable: {0}")]
    Unavailable(String),

    /// The oracle answered with a non-success HTTP status
    #[error("oracle returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The response envelope had no `choices[0].message.content`
    #[error("malformed oracle response: {0}")]
    MalformedResponse(String),
}

impl OracleError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, OracleError::Unavailable(_))
    }

    /// Whether this failure says something about the oracle's health, as
    /// opposed to this particular request.
    pub fn indicates_outage(&self) -> bool {
        match self {
            OracleError::Unavailable(_) => true,
            OracleError::Status { status, .. } => *status >= 500 || *status == 429,
            OracleError::MalformedResponse(_) => false,
        }
    }
}
