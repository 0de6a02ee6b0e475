//! PostgreSQL chat log

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPool, types::Json, FromRow};
use tracing::instrument;
use uuid::Uuid;

use crate::domain::{AnswerConfidence, ChatRole, ChatTurn, SourceSummary};
use crate::infra::{ChatLog, LedgerError, Result};

/// PostgreSQL-backed chat log
#[derive(Clone)]
pub struct PgChatLog {
    pool: PgPool,
}

impl PgChatLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatLog for PgChatLog {
    #[instrument(skip(self, turn), fields(session_id = %turn.session_id, role = %turn.role))]
    async fn append_turn(&self, turn: &ChatTurn) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO chat_turns (id, session_id, role, content, sources, confidence, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(turn.id)
        .bind(&turn.session_id)
        .bind(turn.role.as_str())
        .bind(&turn.content)
        .bind(Json(&turn.sources))
        .bind(turn.confidence.map(|c| c.as_str()))
        .bind(turn.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn session_history(&self, session_id: &str, limit: usize) -> Result<Vec<ChatTurn>> {
        // Latest `limit` turns, returned oldest first
        let rows = sqlx::query_as::<_, TurnRow>(
            r#"
            SELECT id, session_id, role, content, sources, confidence, created_at
            FROM (
                SELECT * FROM chat_turns
                WHERE session_id = $1
                ORDER BY created_at DESC
                LIMIT $2
            ) latest
            ORDER BY created_at ASC
            "#,
        )
        .bind(session_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TurnRow::into_turn).collect()
    }

    #[instrument(skip(self))]
    async fn purge_session(&self, session_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chat_turns WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[derive(FromRow)]
struct TurnRow {
    id: Uuid,
    session_id: String,
    role: String,
    content: String,
    sources: Json<Vec<SourceSummary>>,
    confidence: Option<String>,
    created_at: DateTime<Utc>,
}

impl TurnRow {
    fn into_turn(self) -> Result<ChatTurn> {
        let role = ChatRole::parse(&self.role)
            .ok_or_else(|| LedgerError::Store(format!("invalid chat role: {}", self.role)))?;
        Ok(ChatTurn {
            id: self.id,
            session_id: self.session_id,
            role,
            content: self.content,
            sources: self.sources.0,
            confidence: self.confidence.as_deref().and_then(AnswerConfidence::parse),
            created_at: self.created_at,
        })
    }
}
