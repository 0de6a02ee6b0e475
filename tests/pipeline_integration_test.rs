//! Verification and query pipelines end to end, over the in-memory store and
//! a scripted oracle.

mod common;

use std::sync::Arc;

use statement_ledger::domain::{
    AnswerConfidence, ChatRole, Confidence, LedgerEntry, NewStatement, RetrievalStrategy,
    VerificationStatus, NO_RESULTS_ANSWER, NOT_PROVIDED, PARSE_FAILURE_ISSUE,
};
use statement_ledger::infra::{
    ChatLog, InMemoryChatLog, InMemoryLedgerStore, LedgerError, LedgerStore, RetryConfig,
};
use statement_ledger::ledger::{
    ChainLinker, Claim, QueryPipeline, RetrievalMode, VerificationPipeline, UNKNOWN_SPEAKER,
};
use statement_ledger::metrics::{metric_names, MetricsRegistry};
use statement_ledger::oracle::{CompletionOracle, OracleError};

use common::*;

struct Fixture {
    store: Arc<InMemoryLedgerStore>,
    chat_log: Arc<InMemoryChatLog>,
    metrics: Arc<MetricsRegistry>,
    entries: Vec<LedgerEntry>,
}

impl Fixture {
    async fn seeded() -> Self {
        let store = Arc::new(InMemoryLedgerStore::new());
        let metrics = Arc::new(MetricsRegistry::new());
        let linker =
            ChainLinker::new(store.clone(), metrics.clone()).with_retry(RetryConfig::immediate(3));

        let mut entries = Vec::new();
        for statement in sample_statements() {
            entries.push(linker.append(statement).await.unwrap());
        }

        Self {
            store,
            chat_log: Arc::new(InMemoryChatLog::new()),
            metrics,
            entries,
        }
    }

    async fn empty() -> Self {
        Self {
            store: Arc::new(InMemoryLedgerStore::new()),
            chat_log: Arc::new(InMemoryChatLog::new()),
            metrics: Arc::new(MetricsRegistry::new()),
            entries: Vec::new(),
        }
    }

    fn verifier(&self, oracle: Option<Arc<ScriptedOracle>>) -> VerificationPipeline {
        VerificationPipeline::new(
            self.store.clone(),
            oracle.map(|o| o as Arc<dyn CompletionOracle>),
            self.metrics.clone(),
        )
    }

    fn query(&self, oracle: Option<Arc<ScriptedOracle>>) -> QueryPipeline {
        QueryPipeline::new(
            self.store.clone(),
            oracle.map(|o| o as Arc<dyn CompletionOracle>),
            self.metrics.clone(),
        )
        .with_chat_log(self.chat_log.clone())
    }
}

// ============================================================================
// Verification
// ============================================================================

#[tokio::test]
async fn verify_entry_persists_a_parsed_judgment() {
    let fx = Fixture::seeded().await;
    let oracle = ScriptedOracle::new([Ok(verified_judgment())]);
    let verifier = fx.verifier(Some(oracle.clone()));

    let target = &fx.entries[0];
    let report = verifier.verify_entry(target.id).await.unwrap();

    assert_eq!(report.statement_id, Some(target.id));
    assert_eq!(report.statement, target.statement);
    assert_eq!(report.speaker, "Alice");
    assert_eq!(report.verification.status, VerificationStatus::Verified);
    assert!(!report.degraded);
    assert!(report.persisted);

    let stored = fx.store.get_by_id(target.id).await.unwrap().unwrap();
    assert_eq!(stored.verification_status, Some(VerificationStatus::Verified));
    assert_eq!(stored.verification_confidence, Some(Confidence::High));

    // The prompt carries the statement being judged
    assert!(oracle.requests()[0].prompt.contains(&target.statement));
}

#[tokio::test]
async fn unparseable_judgment_degrades_exactly() {
    let fx = Fixture::seeded().await;
    let verifier = fx.verifier(Some(ScriptedOracle::new([Ok("not json".to_string())])));

    let target = &fx.entries[1];
    let report = verifier.verify_entry(target.id).await.unwrap();

    assert!(report.degraded);
    assert!(!report.persisted);
    assert_eq!(report.verification.status, VerificationStatus::Unverified);
    assert_eq!(report.verification.confidence, Confidence::Low);
    assert_eq!(report.verification.issues, vec![PARSE_FAILURE_ISSUE.to_string()]);

    let stored = fx.store.get_by_id(target.id).await.unwrap().unwrap();
    assert_eq!(stored.verification_status, None);
    assert_eq!(
        fx.metrics
            .get_counter(metric_names::VERIFICATIONS_DEGRADED)
            .await,
        1
    );
}

#[tokio::test]
async fn partial_judgment_fills_defaults() {
    let fx = Fixture::empty().await;
    let verifier = fx.verifier(Some(ScriptedOracle::new([Ok(
        r#"{"status":"VERIFIED","confidence":"HIGH"}"#.to_string(),
    )])));

    let report = verifier
        .verify(&Claim::new("Water boils at 100C at sea level"))
        .await
        .unwrap();

    let v = report.verification;
    assert_eq!(v.status, VerificationStatus::Verified);
    assert_eq!(v.confidence, Confidence::High);
    assert!(v.key_facts.is_empty());
    assert!(v.issues.is_empty());
    assert_eq!(v.context, "");
    assert_eq!(v.recommendation, NOT_PROVIDED);
    assert_eq!(v.reasoning, NOT_PROVIDED);
    assert_eq!(report.speaker, UNKNOWN_SPEAKER);
    assert!(!report.persisted);
}

#[tokio::test]
async fn verify_without_oracle_is_not_configured() {
    let fx = Fixture::seeded().await;
    let err = fx
        .verifier(None)
        .verify_entry(fx.entries[0].id)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::OracleNotConfigured));
}

#[tokio::test]
async fn verify_surfaces_oracle_failures_and_persists_nothing() {
    let fx = Fixture::seeded().await;
    let verifier = fx.verifier(Some(ScriptedOracle::new([Err(OracleError::Status {
        status: 500,
        body: "upstream".into(),
    })])));

    let target = &fx.entries[0];
    let err = verifier.verify_entry(target.id).await.unwrap_err();
    assert!(matches!(err, LedgerError::Oracle(OracleError::Status { status: 500, .. })));

    let stored = fx.store.get_by_id(target.id).await.unwrap().unwrap();
    assert!(stored.verification_status.is_none());
}

#[tokio::test]
async fn verify_unknown_entry_is_not_found() {
    let fx = Fixture::seeded().await;
    let verifier = fx.verifier(Some(ScriptedOracle::always(&verified_judgment(), 1)));
    let id = uuid::Uuid::new_v4();
    let err = verifier.verify_entry(id).await.unwrap_err();
    assert!(matches!(err, LedgerError::EntryNotFound(missing) if missing == id));
}

// ============================================================================
// Ask
// ============================================================================

#[tokio::test]
async fn ask_on_empty_ledger_has_no_results() {
    let fx = Fixture::empty().await;
    let oracle = ScriptedOracle::new([]);
    let response = fx
        .query(Some(oracle.clone()))
        .ask("anything", None)
        .await
        .unwrap();

    assert_eq!(response.answer, NO_RESULTS_ANSWER);
    assert!(response.sources.is_empty());
    assert_eq!(response.confidence, AnswerConfidence::Low);
    assert_eq!(oracle.call_count(), 0);
}

#[tokio::test]
async fn ask_with_oracle_answer_is_high_confidence_and_logged() {
    let fx = Fixture::seeded().await;
    let oracle = ScriptedOracle::new([Ok("Alice said the sky is blue.".to_string())]);

    let response = fx
        .query(Some(oracle.clone()))
        .ask("What did anyone say about the sky?", Some("session-1"))
        .await
        .unwrap();

    assert_eq!(response.confidence, AnswerConfidence::High);
    assert_eq!(response.answer, "Alice said the sky is blue.");
    assert_eq!(response.retrieval, RetrievalStrategy::FullText);
    assert_eq!(response.sources[0].speaker, "Alice");
    assert!(response.sources[0].source_url.is_some());

    let history = fx.chat_log.session_history("session-1", 10).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, ChatRole::User);
    assert_eq!(history[1].role, ChatRole::Bot);
    assert_eq!(history[1].confidence, Some(AnswerConfidence::High));
}

#[tokio::test]
async fn ask_confidence_follows_oracle_outcome() {
    let fx = Fixture::seeded().await;
    let question = "What did Bob say about unemployment?";

    let unavailable = fx
        .query(Some(ScriptedOracle::new([Err(OracleError::Unavailable(
            "connection refused".into(),
        ))])))
        .ask(question, None)
        .await
        .unwrap();
    assert_eq!(unavailable.confidence, AnswerConfidence::Medium);
    assert!(unavailable.answer.starts_with("Found 1 relevant statement in the ledger:"));

    let unconfigured = fx.query(None).ask(question, None).await.unwrap();
    assert_eq!(unconfigured.confidence, AnswerConfidence::Medium);
    assert_eq!(unconfigured.answer, unavailable.answer);

    let malformed = fx
        .query(Some(ScriptedOracle::new([Err(OracleError::MalformedResponse(
            "no choices".into(),
        ))])))
        .ask(question, None)
        .await
        .unwrap();
    assert_eq!(malformed.confidence, AnswerConfidence::Low);
    assert_eq!(malformed.sources, unavailable.sources);
}

#[tokio::test]
async fn keyword_fallback_finds_partial_words() {
    let fx = Fixture::seeded().await;
    // "inflat" matches no whole term but is a substring of "Inflation"
    let response = fx.query(None).ask("inflat", None).await.unwrap();
    assert_eq!(response.retrieval, RetrievalStrategy::Keyword);
    assert_eq!(response.sources.len(), 1);
    assert_eq!(response.sources[0].speaker, "Bob");
}

#[tokio::test]
async fn oracle_mode_uses_selected_entries() {
    let fx = Fixture::seeded().await;
    let bridge = fx.entries[2].clone();
    let selection = format!("[\"{}\"]", bridge.id);
    let oracle = ScriptedOracle::new([Ok(selection), Ok("It opens in March.".to_string())]);

    let response = fx
        .query(Some(oracle.clone()))
        .with_mode(RetrievalMode::Oracle)
        .ask("When does it open?", None)
        .await
        .unwrap();

    assert_eq!(response.retrieval, RetrievalStrategy::OracleSelection);
    assert_eq!(response.sources.len(), 1);
    assert_eq!(response.sources[0].block_fingerprint, bridge.block_fingerprint);
    assert_eq!(response.confidence, AnswerConfidence::High);
    assert_eq!(oracle.call_count(), 2);
}

#[tokio::test]
async fn oracle_mode_calls_an_unreachable_oracle_once() {
    let fx = Fixture::seeded().await;
    let oracle = ScriptedOracle::new([
        Err(OracleError::Unavailable("connection refused".into())),
        Err(OracleError::Unavailable("connection refused".into())),
    ]);

    let response = fx
        .query(Some(oracle.clone()))
        .with_mode(RetrievalMode::Oracle)
        .ask("What did Bob say about unemployment?", None)
        .await
        .unwrap();

    assert_eq!(oracle.call_count(), 1);
    assert_eq!(response.confidence, AnswerConfidence::Medium);
    assert_eq!(response.retrieval, RetrievalStrategy::FullText);
    assert!(response.answer.starts_with("Found 1 relevant statement in the ledger:"));
}

#[tokio::test]
async fn oversized_query_is_rejected() {
    let fx = Fixture::seeded().await;
    let query = "a".repeat(2001);
    let err = fx.query(None).ask(&query, None).await.unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
}

#[tokio::test]
async fn new_statement_round_trips_through_ask_sources() {
    let fx = Fixture::empty().await;
    let linker = ChainLinker::new(fx.store.clone(), fx.metrics.clone());
    let entry = linker
        .append(NewStatement::new("Quantum computers factor large numbers", "Dana"))
        .await
        .unwrap();

    let response = fx.query(None).ask("quantum", None).await.unwrap();
    assert_eq!(response.sources.len(), 1);
    assert_eq!(response.sources[0].block_fingerprint, entry.block_fingerprint);
    assert_eq!(
        fx.metrics.get_counter(metric_names::ASK_CONFIDENCE_MEDIUM).await,
        1
    );
}
