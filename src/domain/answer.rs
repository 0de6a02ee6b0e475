//! Answers to free-text questions about the ledger.

use serde::{Deserialize, Serialize};

use super::{AnswerConfidence, SourceSummary};

/// Answer returned when retrieval finds no relevant entries.
pub const NO_RESULTS_ANSWER: &str =
    "I couldn't find any statements in the ledger relevant to your question.";

/// Which retrieval strategy produced the candidate entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    FullText,
    Keyword,
    OracleSelection,
    None,
}

/// Response to an `ask` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskResponse {
    pub answer: String,
    pub sources: Vec<SourceSummary>,
    pub confidence: AnswerConfidence,
    pub retrieval: RetrievalStrategy,
}

impl AskResponse {
    /// Fixed response for an empty retrieval result.
    pub fn no_results() -> Self {
        Self {
            answer: NO_RESULTS_ANSWER.to_string(),
            sources: Vec::new(),
            confidence: AnswerConfidence::Low,
            retrieval: RetrievalStrategy::None,
        }
    }
}
