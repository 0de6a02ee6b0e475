//! Common test utilities and fixtures for integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;

use statement_ledger::domain::NewStatement;
use statement_ledger::oracle::{CompletionOracle, CompletionRequest, OracleError};

/// Oracle that replays a fixed script of replies and records every request.
///
/// Once the script runs out every call fails as unavailable.
#[derive(Default)]
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<Result<String, OracleError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedOracle {
    pub fn new(replies: impl IntoIterator<Item = Result<String, OracleError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Oracle that answers every call with the same content.
    pub fn always(content: &str, calls: usize) -> Arc<Self> {
        Self::new((0..calls).map(|_| Ok(content.to_string())))
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionOracle for ScriptedOracle {
    async fn complete(&self, request: CompletionRequest) -> Result<String, OracleError> {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(OracleError::Unavailable("script exhausted".to_string())))
    }
}

/// A well-formed verification judgment.
pub fn verified_judgment() -> String {
    serde_json::json!({
        "status": "VERIFIED",
        "confidence": "HIGH",
        "keyFacts": ["Water boils at 100C at standard pressure"],
        "issues": [],
        "context": "Physics",
        "recommendation": "None",
        "reasoning": "Well established"
    })
    .to_string()
}

/// A handful of statements from different speakers.
pub fn sample_statements() -> Vec<NewStatement> {
    vec![
        NewStatement::new("The sky is blue on clear days", "Alice")
            .with_source_url("https://example.com/sky"),
        NewStatement::new("Unemployment fell to 3.5 percent last quarter", "Bob")
            .with_statement_date(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()),
        NewStatement::new("The new bridge will open in March", "Carol"),
        NewStatement::new("Inflation is under control", "Bob"),
    ]
}
