//! Query pipeline
//!
//! Answers free-text questions from ledger content. Retrieval tries its
//! strategies in order and the first one that yields candidates wins:
//!
//! | mode        | order                                        |
//! |-------------|----------------------------------------------|
//! | `full_text` | full-text search, keyword match              |
//! | `oracle`    | oracle selection, full-text, keyword match   |
//!
//! Oracle failures never fail the request; they lower the answer's
//! confidence instead. Each request calls the oracle at most once per stage
//! and stops calling it after the first failure.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::domain::{
    strip_code_fence, AnswerConfidence, AskResponse, ChatTurn, LedgerEntry, RetrievalStrategy,
};
use crate::infra::{ChatLog, LedgerError, LedgerStore, Result};
use crate::metrics::{metric_names, MetricsRegistry};
use crate::oracle::{CompletionOracle, CompletionRequest, OracleError};

/// Candidates handed to answer synthesis.
pub const MAX_CANDIDATES: usize = 5;

/// Recent entries shown to the oracle for relevance selection.
pub const SELECTION_SNAPSHOT: usize = 50;

/// Longest accepted question, in characters.
pub const MAX_QUERY_CHARS: usize = 2000;

const ANSWER_TEMPERATURE: f32 = 0.3;
const ANSWER_MAX_TOKENS: u32 = 800;
const SELECT_TEMPERATURE: f32 = 0.0;
const SELECT_MAX_TOKENS: u32 = 300;

const ANSWER_SYSTEM_PROMPT: &str = "You answer questions using only the ledger statements \
provided in the context. Cite speakers when relevant. If the context does not contain enough \
information to answer, say so explicitly instead of guessing.";

const SELECT_SYSTEM_PROMPT: &str = "You select ledger statements relevant to a question. \
Respond only with a JSON array of statement ids.";

/// Which strategy retrieval tries first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetrievalMode {
    #[default]
    FullText,
    Oracle,
}

impl FromStr for RetrievalMode {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full_text" | "fulltext" => Ok(RetrievalMode::FullText),
            "oracle" => Ok(RetrievalMode::Oracle),
            other => Err(LedgerError::Configuration(format!(
                "unknown retrieval mode: {other}"
            ))),
        }
    }
}

/// Resolves questions to ledger entries and synthesizes answers.
pub struct QueryPipeline {
    store: Arc<dyn LedgerStore>,
    oracle: Option<Arc<dyn CompletionOracle>>,
    chat_log: Option<Arc<dyn ChatLog>>,
    mode: RetrievalMode,
    metrics: Arc<MetricsRegistry>,
}

impl QueryPipeline {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        oracle: Option<Arc<dyn CompletionOracle>>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            store,
            oracle,
            chat_log: None,
            mode: RetrievalMode::default(),
            metrics,
        }
    }

    pub fn with_chat_log(mut self, chat_log: Arc<dyn ChatLog>) -> Self {
        self.chat_log = Some(chat_log);
        self
    }

    pub fn with_mode(mut self, mode: RetrievalMode) -> Self {
        self.mode = mode;
        self
    }

    /// Answer `query` from ledger content.
    ///
    /// With a `session_id` the question and answer are appended to the chat
    /// log; failures to do so are logged and ignored.
    #[instrument(skip(self, query), fields(mode = ?self.mode))]
    pub async fn ask(&self, query: &str, session_id: Option<&str>) -> Result<AskResponse> {
        let query = query.trim();
        if query.is_empty() || query.chars().count() > MAX_QUERY_CHARS {
            self.metrics
                .inc_counter(metric_names::VALIDATION_ERRORS)
                .await;
            return Err(LedgerError::Validation(format!(
                "query must be between 1 and {MAX_QUERY_CHARS} characters"
            )));
        }
        self.metrics.inc_counter(metric_names::ASK_REQUESTS).await;

        if let Some(session) = session_id {
            self.log_turn(ChatTurn::user(session, query)).await;
        }

        let retrieved = match self.retrieve(query).await {
            Ok(found) => found,
            Err(e) => {
                self.metrics.inc_counter(metric_names::STORE_ERRORS).await;
                return Err(e);
            }
        };

        let response = if retrieved.candidates.is_empty() {
            AskResponse::no_results()
        } else if let Some(e) = &retrieved.oracle_failure {
            summary_response(&retrieved.candidates, retrieved.strategy, e)
        } else {
            self.answer(query, &retrieved.candidates, retrieved.strategy)
                .await
        };

        self.metrics
            .inc_counter(match response.confidence {
                AnswerConfidence::High => metric_names::ASK_CONFIDENCE_HIGH,
                AnswerConfidence::Medium => metric_names::ASK_CONFIDENCE_MEDIUM,
                AnswerConfidence::Low => metric_names::ASK_CONFIDENCE_LOW,
            })
            .await;

        if let Some(session) = session_id {
            self.log_turn(ChatTurn::bot(
                session,
                response.answer.clone(),
                response.sources.clone(),
                response.confidence,
            ))
            .await;
        }

        Ok(response)
    }

    async fn retrieve(&self, query: &str) -> Result<Retrieved> {
        let mut oracle_failure = None;
        if self.mode == RetrievalMode::Oracle {
            match self.oracle_select(query).await {
                Ok(Some(selected)) => {
                    return Ok(Retrieved::new(selected, RetrievalStrategy::OracleSelection))
                }
                Ok(None) => {}
                Err(e) => oracle_failure = Some(e),
            }
        }

        let (candidates, strategy) = self.store_retrieve(query).await?;
        Ok(Retrieved {
            candidates,
            strategy,
            oracle_failure,
        })
    }

    async fn store_retrieve(&self, query: &str) -> Result<(Vec<LedgerEntry>, RetrievalStrategy)> {
        let full_text_error = match self.store.search(query, MAX_CANDIDATES).await {
            Ok(hits) if !hits.is_empty() => return Ok((hits, RetrievalStrategy::FullText)),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Full-text search failed, falling back to keywords");
                Some(e)
            }
        };

        let words = keywords(query);
        if words.is_empty() {
            return match full_text_error {
                Some(e) => Err(e),
                None => Ok((Vec::new(), RetrievalStrategy::None)),
            };
        }

        match self.store.keyword_search(&words, MAX_CANDIDATES).await {
            Ok(hits) if !hits.is_empty() => Ok((hits, RetrievalStrategy::Keyword)),
            Ok(_) => Ok((Vec::new(), RetrievalStrategy::None)),
            Err(e) if full_text_error.is_some() => Err(e),
            Err(e) => {
                warn!(error = %e, "Keyword search failed");
                Ok((Vec::new(), RetrievalStrategy::None))
            }
        }
    }

    /// Let the oracle pick relevant entries from a recent snapshot.
    ///
    /// `Ok(None)` means selection produced nothing usable and retrieval
    /// should fall back to the store strategies. An oracle error is returned
    /// so the caller does not call the oracle again for this request.
    async fn oracle_select(
        &self,
        query: &str,
    ) -> std::result::Result<Option<Vec<LedgerEntry>>, OracleError> {
        let Some(oracle) = self.oracle.as_ref() else {
            return Ok(None);
        };

        let snapshot = match self.store.recent(SELECTION_SNAPSHOT).await {
            Ok(entries) if !entries.is_empty() => entries,
            Ok(_) => return Ok(None),
            Err(e) => {
                warn!(error = %e, "Could not load snapshot for oracle selection");
                return Ok(None);
            }
        };

        let request = CompletionRequest::new(SELECT_SYSTEM_PROMPT, selection_prompt(query, &snapshot))
            .with_temperature(SELECT_TEMPERATURE)
            .with_max_tokens(SELECT_MAX_TOKENS);

        let content = match oracle.complete(request).await {
            Ok(content) => content,
            Err(e) => {
                self.metrics.inc_counter(metric_names::ORACLE_FAILURES).await;
                warn!(error = %e, "Oracle selection failed, skipping answer synthesis");
                return Err(e);
            }
        };

        let selected = select_from_snapshot(&content, snapshot);
        if selected.is_empty() {
            debug!("Oracle selection returned no usable ids");
            return Ok(None);
        }
        Ok(Some(selected))
    }

    async fn answer(
        &self,
        query: &str,
        candidates: &[LedgerEntry],
        retrieval: RetrievalStrategy,
    ) -> AskResponse {
        let sources = candidates.iter().map(LedgerEntry::summary).collect();

        let Some(oracle) = self.oracle.as_ref() else {
            return AskResponse {
                answer: database_summary(candidates),
                sources,
                confidence: AnswerConfidence::Medium,
                retrieval,
            };
        };

        let request = CompletionRequest::new(ANSWER_SYSTEM_PROMPT, answer_prompt(query, candidates))
            .with_temperature(ANSWER_TEMPERATURE)
            .with_max_tokens(ANSWER_MAX_TOKENS);

        let outcome = oracle.complete(request).await.and_then(|content| {
            if content.trim().is_empty() {
                Err(OracleError::MalformedResponse("empty answer".to_string()))
            } else {
                Ok(content)
            }
        });

        match outcome {
            Ok(content) => AskResponse {
                answer: content.trim().to_string(),
                sources,
                confidence: AnswerConfidence::High,
                retrieval,
            },
            Err(e) => {
                self.metrics.inc_counter(metric_names::ORACLE_FAILURES).await;
                warn!(error = %e, "Answer synthesis failed, returning database summary");
                summary_response(candidates, retrieval, &e)
            }
        }
    }

    async fn log_turn(&self, turn: ChatTurn) {
        let Some(chat_log) = self.chat_log.as_ref() else {
            return;
        };
        if let Err(e) = chat_log.append_turn(&turn).await {
            warn!(session_id = %turn.session_id, role = %turn.role, error = %e, "Failed to log chat turn");
        }
    }
}

/// Candidates found for a question, plus any oracle failure met on the way.
struct Retrieved {
    candidates: Vec<LedgerEntry>,
    strategy: RetrievalStrategy,
    oracle_failure: Option<OracleError>,
}

impl Retrieved {
    fn new(candidates: Vec<LedgerEntry>, strategy: RetrievalStrategy) -> Self {
        Self {
            candidates,
            strategy,
            oracle_failure: None,
        }
    }
}

/// Database summary after an oracle failure; an unreachable oracle rates
/// MEDIUM, a misbehaving one LOW.
fn summary_response(
    candidates: &[LedgerEntry],
    retrieval: RetrievalStrategy,
    failure: &OracleError,
) -> AskResponse {
    AskResponse {
        answer: database_summary(candidates),
        sources: candidates.iter().map(LedgerEntry::summary).collect(),
        confidence: if failure.is_unavailable() {
            AnswerConfidence::Medium
        } else {
            AnswerConfidence::Low
        },
        retrieval,
    }
}

/// Distinct lowercased words longer than two characters, in query order.
pub fn keywords(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 2)
        .map(str::to_lowercase)
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

/// Keep the snapshot entries whose ids the oracle returned, in its order.
///
/// Anything other than a JSON array yields nothing; unknown or repeated ids
/// are skipped.
pub fn select_from_snapshot(content: &str, snapshot: Vec<LedgerEntry>) -> Vec<LedgerEntry> {
    let Ok(Value::Array(ids)) = serde_json::from_str::<Value>(strip_code_fence(content)) else {
        return Vec::new();
    };

    let mut pool = snapshot;
    let mut selected = Vec::new();
    for id in ids.iter().filter_map(Value::as_str) {
        let Ok(id) = Uuid::parse_str(id.trim()) else {
            continue;
        };
        if let Some(pos) = pool.iter().position(|e| e.id == id) {
            selected.push(pool.swap_remove(pos));
        }
        if selected.len() == MAX_CANDIDATES {
            break;
        }
    }
    selected
}

fn selection_prompt(query: &str, snapshot: &[LedgerEntry]) -> String {
    let records: Vec<String> = snapshot
        .iter()
        .map(|e| {
            json!({
                "id": e.id,
                "statement": e.statement,
                "speaker": e.speaker,
                "date": e.statement_date,
            })
            .to_string()
        })
        .collect();

    format!(
        "Question: {query}\n\nStatements (one JSON record per line):\n{}\n\n\
Return a JSON array with the ids of the 3 to 5 statements most relevant to the question, \
most relevant first. Return [] if none are relevant.",
        records.join("\n")
    )
}

fn context_block(candidates: &[LedgerEntry]) -> String {
    candidates
        .iter()
        .enumerate()
        .map(|(i, e)| {
            format!(
                "[{n}] \"{statement}\"\n    Speaker: {speaker}\n    Date: {date}\n    Source: {source}",
                n = i + 1,
                statement = e.statement,
                speaker = e.speaker,
                date = e
                    .statement_date
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
                source = e.source_url.as_deref().unwrap_or("none"),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn answer_prompt(query: &str, candidates: &[LedgerEntry]) -> String {
    format!(
        "Context:\n{}\n\nQuestion: {query}\n\nAnswer strictly from the context above.",
        context_block(candidates)
    )
}

/// Context-free answer built from the candidates alone.
pub fn database_summary(candidates: &[LedgerEntry]) -> String {
    let mut summary = format!(
        "Found {} relevant statement{} in the ledger:",
        candidates.len(),
        if candidates.len() == 1 { "" } else { "s" }
    );
    for e in candidates {
        summary.push_str(&format!("\n- \"{}\" ({}", e.statement, e.speaker));
        if let Some(date) = e.statement_date {
            summary.push_str(&format!(", {date}"));
        }
        summary.push(')');
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewStatement, NO_RESULTS_ANSWER};
    use crate::infra::{MockChatLog, MockLedgerStore};
    use crate::oracle::MockCompletionOracle;
    use chrono::Utc;

    fn entry(statement: &str) -> LedgerEntry {
        LedgerEntry::seal(&NewStatement::new(statement, "Alice"), None, Utc::now())
    }

    fn store_with_hits(hits: Vec<LedgerEntry>) -> MockLedgerStore {
        let mut store = MockLedgerStore::new();
        store
            .expect_search()
            .returning(move |_, _| Ok(hits.clone()));
        store.expect_keyword_search().returning(|_, _| Ok(Vec::new()));
        store
    }

    fn pipeline(store: MockLedgerStore, oracle: Option<MockCompletionOracle>) -> QueryPipeline {
        let oracle = oracle.map(|o| Arc::new(o) as Arc<dyn CompletionOracle>);
        QueryPipeline::new(Arc::new(store), oracle, Arc::new(MetricsRegistry::new()))
    }

    fn failing_oracle(error: OracleError) -> MockCompletionOracle {
        let mut oracle = MockCompletionOracle::new();
        oracle
            .expect_complete()
            .returning(move |_| Err(error.clone()));
        oracle
    }

    #[test]
    fn test_keywords() {
        assert_eq!(
            keywords("What did Alice say about the budget? The BUDGET!"),
            vec!["what", "did", "alice", "say", "about", "the", "budget"]
        );
        assert!(keywords("is it ok").is_empty());
    }

    #[test]
    fn test_select_from_snapshot() {
        let a = entry("a");
        let b = entry("b");
        let content = format!(
            "```json\n[\"{}\", \"{}\", \"not-a-uuid\", \"{}\", \"{}\"]\n```",
            b.id,
            a.id,
            Uuid::new_v4(),
            b.id
        );
        let selected = select_from_snapshot(&content, vec![a.clone(), b.clone()]);
        assert_eq!(selected.iter().map(|e| e.id).collect::<Vec<_>>(), vec![b.id, a.id]);

        assert!(select_from_snapshot("{\"ids\": []}", vec![a.clone()]).is_empty());
        assert!(select_from_snapshot("nonsense", vec![a]).is_empty());
    }

    #[test]
    fn test_retrieval_mode_from_str() {
        assert_eq!("full_text".parse::<RetrievalMode>().unwrap(), RetrievalMode::FullText);
        assert_eq!(" ORACLE ".parse::<RetrievalMode>().unwrap(), RetrievalMode::Oracle);
        assert!("vector".parse::<RetrievalMode>().is_err());
    }

    #[tokio::test]
    async fn test_ask_rejects_blank_query() {
        let pipeline = pipeline(MockLedgerStore::new(), None);
        let err = pipeline.ask("   ", None).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[tokio::test]
    async fn test_ask_with_no_candidates_is_low_confidence() {
        let mut oracle = MockCompletionOracle::new();
        oracle.expect_complete().never();
        let pipeline = pipeline(store_with_hits(Vec::new()), Some(oracle));

        let response = pipeline.ask("anything", None).await.unwrap();
        assert_eq!(response.answer, NO_RESULTS_ANSWER);
        assert!(response.sources.is_empty());
        assert_eq!(response.confidence, AnswerConfidence::Low);
        assert_eq!(response.retrieval, RetrievalStrategy::None);
    }

    #[tokio::test]
    async fn test_confidence_follows_oracle_outcome() {
        let hits = vec![entry("The budget deficit fell")];

        let mut answering = MockCompletionOracle::new();
        answering
            .expect_complete()
            .withf(|req| req.prompt.contains("The budget deficit fell"))
            .returning(|_| Ok("It fell.".to_string()));
        let high = pipeline(store_with_hits(hits.clone()), Some(answering))
            .ask("budget", None)
            .await
            .unwrap();
        assert_eq!(high.confidence, AnswerConfidence::High);
        assert_eq!(high.answer, "It fell.");
        assert_eq!(high.retrieval, RetrievalStrategy::FullText);

        let unavailable = pipeline(
            store_with_hits(hits.clone()),
            Some(failing_oracle(OracleError::Unavailable("timeout".to_string()))),
        )
        .ask("budget", None)
        .await
        .unwrap();
        assert_eq!(unavailable.confidence, AnswerConfidence::Medium);
        assert!(unavailable.answer.starts_with("Found 1 relevant statement in the ledger"));

        let unconfigured = pipeline(store_with_hits(hits.clone()), None)
            .ask("budget", None)
            .await
            .unwrap();
        assert_eq!(unconfigured.confidence, AnswerConfidence::Medium);

        let malformed = pipeline(
            store_with_hits(hits.clone()),
            Some(failing_oracle(OracleError::MalformedResponse("x".to_string()))),
        )
        .ask("budget", None)
        .await
        .unwrap();
        assert_eq!(malformed.confidence, AnswerConfidence::Low);
        assert_eq!(malformed.sources.len(), 1);
        assert_eq!(malformed.sources[0].id, hits[0].id);
    }

    #[tokio::test]
    async fn test_full_text_error_falls_back_to_keywords() {
        let hit = entry("Inflation reached 3 percent");
        let hit_id = hit.id;

        let mut store = MockLedgerStore::new();
        store
            .expect_search()
            .returning(|_, _| Err(LedgerError::Store("tsquery syntax".to_string())));
        store
            .expect_keyword_search()
            .withf(|words, limit| words.contains(&"inflation".to_string()) && *limit == MAX_CANDIDATES)
            .returning(move |_, _| Ok(vec![hit.clone()]));

        let response = pipeline(store, None)
            .ask("inflation?", None)
            .await
            .unwrap();
        assert_eq!(response.retrieval, RetrievalStrategy::Keyword);
        assert_eq!(response.sources[0].id, hit_id);
    }

    #[tokio::test]
    async fn test_both_store_strategies_failing_surfaces_error() {
        let mut store = MockLedgerStore::new();
        store
            .expect_search()
            .returning(|_, _| Err(LedgerError::Store("down".to_string())));
        store
            .expect_keyword_search()
            .returning(|_, _| Err(LedgerError::Store("down".to_string())));

        let err = pipeline(store, None).ask("inflation", None).await.unwrap_err();
        assert!(err.is_store_error());
    }

    #[tokio::test]
    async fn test_oracle_mode_selects_then_answers() {
        let a = entry("Exports grew 4 percent");
        let b = entry("Imports fell");
        let a_id = a.id;
        let snapshot = vec![b.clone(), a.clone()];

        let mut store = MockLedgerStore::new();
        store
            .expect_recent()
            .withf(|limit| *limit == SELECTION_SNAPSHOT)
            .returning(move |_| Ok(snapshot.clone()));
        store.expect_search().never();

        let mut oracle = MockCompletionOracle::new();
        let mut seq = mockall::Sequence::new();
        oracle
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| Ok(format!("[\"{a_id}\"]")));
        oracle
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("Exports grew.".to_string()));

        let response = pipeline(store, Some(oracle))
            .with_mode(RetrievalMode::Oracle)
            .ask("trade", None)
            .await
            .unwrap();
        assert_eq!(response.retrieval, RetrievalStrategy::OracleSelection);
        assert_eq!(response.sources.len(), 1);
        assert_eq!(response.sources[0].id, a_id);
        assert_eq!(response.confidence, AnswerConfidence::High);
    }

    #[tokio::test]
    async fn test_oracle_mode_falls_back_on_unparseable_selection() {
        let hit = entry("Trade balance improved");

        let mut store = store_with_hits(vec![hit.clone()]);
        store
            .expect_recent()
            .returning(move |_| Ok(vec![hit.clone()]));

        let mut oracle = MockCompletionOracle::new();
        oracle
            .expect_complete()
            .returning(|_| Ok("the first one".to_string()));

        let response = pipeline(store, Some(oracle))
            .with_mode(RetrievalMode::Oracle)
            .ask("trade balance", None)
            .await
            .unwrap();
        assert_eq!(response.retrieval, RetrievalStrategy::FullText);
    }

    #[tokio::test]
    async fn test_failed_selection_skips_answer_synthesis() {
        let hit = entry("Tariffs were raised");
        let cases = [
            (OracleError::Unavailable("timeout".to_string()), AnswerConfidence::Medium),
            (
                OracleError::Status {
                    status: 500,
                    body: "boom".to_string(),
                },
                AnswerConfidence::Low,
            ),
        ];

        for (error, expected) in cases {
            let recent = hit.clone();
            let mut store = store_with_hits(vec![hit.clone()]);
            store
                .expect_recent()
                .returning(move |_| Ok(vec![recent.clone()]));

            let mut oracle = MockCompletionOracle::new();
            oracle
                .expect_complete()
                .times(1)
                .returning(move |_| Err(error.clone()));

            let response = pipeline(store, Some(oracle))
                .with_mode(RetrievalMode::Oracle)
                .ask("tariffs", None)
                .await
                .unwrap();
            assert_eq!(response.confidence, expected);
            assert_eq!(response.retrieval, RetrievalStrategy::FullText);
            assert_eq!(response.sources[0].id, hit.id);
            assert!(response.answer.starts_with("Found 1 relevant statement"));
        }
    }

    #[tokio::test]
    async fn test_session_turns_are_logged_and_failures_ignored() {
        let mut chat_log = MockChatLog::new();
        chat_log
            .expect_append_turn()
            .times(2)
            .returning(|_| Err(LedgerError::Store("chat table missing".to_string())));

        let response = pipeline(store_with_hits(Vec::new()), None)
            .with_chat_log(Arc::new(chat_log))
            .ask("anything", Some("session-1"))
            .await
            .unwrap();
        assert_eq!(response.confidence, AnswerConfidence::Low);
    }

    #[test]
    fn test_database_summary() {
        let e = entry("Sky is blue");
        let summary = database_summary(&[e]);
        assert_eq!(
            summary,
            "Found 1 relevant statement in the ledger:\n- \"Sky is blue\" (Alice)"
        );
    }
}
