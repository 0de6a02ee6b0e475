//! In-memory store backends
//!
//! Same compare-and-swap contract as the PostgreSQL adapters, without
//! durability. Used for local development and tests.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::crypto::GENESIS_HASH;
use crate::domain::{ChatTurn, Confidence, LedgerEntry, VerificationStatus};

use super::{AppendOutcome, ChatLog, LedgerStore, Result};

#[derive(Default)]
struct LedgerState {
    /// Ordered by height; index `i` holds height `i + 1`.
    entries: Vec<LedgerEntry>,
    claimed_predecessors: HashSet<String>,
}

impl LedgerState {
    fn tail_fingerprint(&self) -> &str {
        self.entries
            .last()
            .map(|tail| tail.block_fingerprint.as_str())
            .unwrap_or(GENESIS_HASH)
    }
}

/// Ledger store held in process memory.
#[derive(Default)]
pub struct InMemoryLedgerStore {
    state: RwLock<LedgerState>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn append_entry(&self, entry: &LedgerEntry) -> Result<AppendOutcome> {
        let mut state = self.state.write().await;

        let expected_height = state.entries.len() as u64 + 1;
        if entry.previous_hash != state.tail_fingerprint()
            || entry.height != expected_height
            || state.claimed_predecessors.contains(&entry.previous_hash)
        {
            return Ok(AppendOutcome::TailMoved);
        }

        state
            .claimed_predecessors
            .insert(entry.previous_hash.clone());
        state.entries.push(entry.clone());
        Ok(AppendOutcome::Appended)
    }

    async fn latest_entry(&self) -> Result<Option<LedgerEntry>> {
        Ok(self.state.read().await.entries.last().cloned())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<LedgerEntry>> {
        let state = self.state.read().await;
        Ok(state.entries.iter().find(|e| e.id == id).cloned())
    }

    async fn get_by_block_fingerprint(&self, fingerprint: &str) -> Result<Option<LedgerEntry>> {
        let state = self.state.read().await;
        Ok(state
            .entries
            .iter()
            .find(|e| e.block_fingerprint == fingerprint)
            .cloned())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<LedgerEntry>> {
        let terms = search_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let state = self.state.read().await;
        let mut scored: Vec<(usize, &LedgerEntry)> = state
            .entries
            .iter()
            .filter_map(|entry| {
                let words = search_terms(&entry.statement);
                let score = terms.iter().filter(|t| words.contains(*t)).count();
                (score > 0).then_some((score, entry))
            })
            .collect();

        // Best score first, newer entries break ties
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.height.cmp(&a.1.height)));
        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(_, entry)| entry.clone())
            .collect())
    }

    async fn keyword_search(&self, keywords: &[String], limit: usize) -> Result<Vec<LedgerEntry>> {
        if keywords.is_empty() {
            return Ok(Vec::new());
        }
        let needles: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();

        let state = self.state.read().await;
        Ok(state
            .entries
            .iter()
            .rev()
            .filter(|entry| {
                let haystack = entry.statement.to_lowercase();
                needles.iter().any(|n| haystack.contains(n.as_str()))
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<LedgerEntry>> {
        let state = self.state.read().await;
        Ok(state.entries.iter().rev().take(limit).cloned().collect())
    }

    async fn record_verification(
        &self,
        id: Uuid,
        status: VerificationStatus,
        confidence: Confidence,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) if entry.verification_status.is_none() => {
                entry.verification_status = Some(status);
                entry.verification_confidence = Some(confidence);
                entry.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Lowercased alphanumeric words, roughly what a text-search parser keeps.
fn search_terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 2)
        .map(str::to_lowercase)
        .collect()
}

/// Chat log held in process memory.
#[derive(Default)]
pub struct InMemoryChatLog {
    turns: RwLock<Vec<ChatTurn>>,
}

impl InMemoryChatLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatLog for InMemoryChatLog {
    async fn append_turn(&self, turn: &ChatTurn) -> Result<()> {
        self.turns.write().await.push(turn.clone());
        Ok(())
    }

    async fn session_history(&self, session_id: &str, limit: usize) -> Result<Vec<ChatTurn>> {
        let turns = self.turns.read().await;
        let session: Vec<&ChatTurn> = turns
            .iter()
            .filter(|t| t.session_id == session_id)
            .collect();
        let skip = session.len().saturating_sub(limit);
        Ok(session.into_iter().skip(skip).cloned().collect())
    }

    async fn purge_session(&self, session_id: &str) -> Result<u64> {
        let mut turns = self.turns.write().await;
        let before = turns.len();
        turns.retain(|t| t.session_id != session_id);
        Ok((before - turns.len()) as u64)
    }
}
