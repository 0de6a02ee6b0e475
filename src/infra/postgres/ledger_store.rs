//! PostgreSQL ledger store
//!
//! # Compare-and-swap append
//!
//! `ledger_entries.previous_hash` and `ledger_entries.height` are both
//! `UNIQUE`, so at most one row can claim any predecessor:
//! ```sql
//! INSERT INTO ledger_entries (...) VALUES (...)
//! ON CONFLICT DO NOTHING;
//! ```
//! One affected row means the observed tail was still the tail. Zero rows
//! means a concurrent append won, and the caller must re-read the tail.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{postgres::PgPool, FromRow};
use tracing::instrument;
use uuid::Uuid;

use crate::domain::{Confidence, LedgerEntry, VerificationStatus};
use crate::infra::{AppendOutcome, LedgerError, LedgerStore, Result};

const ENTRY_COLUMNS: &str = r#"
    id, height, statement, speaker, source_url, statement_date,
    statement_fingerprint, previous_hash, block_fingerprint,
    verification_status, verification_confidence, created_at, updated_at
"#;

/// PostgreSQL-backed ledger store
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_many(&self, sql: &str, binder: Binder<'_>, limit: usize) -> Result<Vec<LedgerEntry>> {
        let query = sqlx::query_as::<_, EntryRow>(sql);
        let query = match binder {
            Binder::None => query,
            Binder::Text(text) => query.bind(text),
            Binder::Patterns(patterns) => query.bind(patterns),
        };
        let rows = query.bind(clamp_limit(limit)).fetch_all(&self.pool).await?;
        rows.into_iter().map(EntryRow::into_entry).collect()
    }
}

enum Binder<'a> {
    None,
    Text(&'a str),
    Patterns(Vec<String>),
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    #[instrument(skip(self, entry), fields(height = entry.height, previous_hash = %entry.previous_hash))]
    async fn append_entry(&self, entry: &LedgerEntry) -> Result<AppendOutcome> {
        let height = i64::try_from(entry.height)
            .map_err(|_| LedgerError::Internal(format!("height {} out of range", entry.height)))?;

        let result = sqlx::query(
            r#"
            INSERT INTO ledger_entries (
                id, height, statement, speaker, source_url, statement_date,
                statement_fingerprint, previous_hash, block_fingerprint,
                verification_status, verification_confidence, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(entry.id)
        .bind(height)
        .bind(&entry.statement)
        .bind(&entry.speaker)
        .bind(&entry.source_url)
        .bind(entry.statement_date)
        .bind(&entry.statement_fingerprint)
        .bind(&entry.previous_hash)
        .bind(&entry.block_fingerprint)
        .bind(entry.verification_status.map(|s| s.as_str()))
        .bind(entry.verification_confidence.map(|c| c.as_str()))
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            Ok(AppendOutcome::Appended)
        } else {
            Ok(AppendOutcome::TailMoved)
        }
    }

    async fn latest_entry(&self) -> Result<Option<LedgerEntry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM ledger_entries ORDER BY height DESC LIMIT 1");
        let row = sqlx::query_as::<_, EntryRow>(&sql)
            .fetch_optional(&self.pool)
            .await?;
        row.map(EntryRow::into_entry).transpose()
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<LedgerEntry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE id = $1");
        let row = sqlx::query_as::<_, EntryRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(EntryRow::into_entry).transpose()
    }

    async fn get_by_block_fingerprint(&self, fingerprint: &str) -> Result<Option<LedgerEntry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE block_fingerprint = $1");
        let row = sqlx::query_as::<_, EntryRow>(&sql)
            .bind(fingerprint)
            .fetch_optional(&self.pool)
            .await?;
        row.map(EntryRow::into_entry).transpose()
    }

    #[instrument(skip(self))]
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<LedgerEntry>> {
        let sql = format!(
            r#"
            SELECT {ENTRY_COLUMNS} FROM ledger_entries
            WHERE to_tsvector('english', statement) @@ plainto_tsquery('english', $1)
            ORDER BY ts_rank(to_tsvector('english', statement), plainto_tsquery('english', $1)) DESC,
                     height DESC
            LIMIT $2
            "#
        );
        self.fetch_many(&sql, Binder::Text(query), limit).await
    }

    #[instrument(skip(self))]
    async fn keyword_search(&self, keywords: &[String], limit: usize) -> Result<Vec<LedgerEntry>> {
        if keywords.is_empty() {
            return Ok(Vec::new());
        }
        let patterns = keywords
            .iter()
            .map(|k| format!("%{}%", escape_like(k)))
            .collect();
        let sql = format!(
            r#"
            SELECT {ENTRY_COLUMNS} FROM ledger_entries
            WHERE statement ILIKE ANY($1)
            ORDER BY height DESC
            LIMIT $2
            "#
        );
        self.fetch_many(&sql, Binder::Patterns(patterns), limit).await
    }

    async fn recent(&self, limit: usize) -> Result<Vec<LedgerEntry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM ledger_entries ORDER BY height DESC LIMIT $1");
        self.fetch_many(&sql, Binder::None, limit).await
    }

    #[instrument(skip(self))]
    async fn record_verification(
        &self,
        id: Uuid,
        status: VerificationStatus,
        confidence: Confidence,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE ledger_entries
            SET verification_status = $2,
                verification_confidence = $3,
                updated_at = NOW()
            WHERE id = $1 AND verification_status IS NULL
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(confidence.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

/// Escape `%`, `_` and `\` so keywords match literally under ILIKE.
pub(crate) fn escape_like(keyword: &str) -> String {
    let mut escaped = String::with_capacity(keyword.len());
    for c in keyword.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn clamp_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[derive(FromRow)]
struct EntryRow {
    id: Uuid,
    height: i64,
    statement: String,
    speaker: String,
    source_url: Option<String>,
    statement_date: Option<NaiveDate>,
    statement_fingerprint: String,
    previous_hash: String,
    block_fingerprint: String,
    verification_status: Option<String>,
    verification_confidence: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl EntryRow {
    fn into_entry(self) -> Result<LedgerEntry> {
        let verification_status = self
            .verification_status
            .as_deref()
            .map(|s| {
                VerificationStatus::parse(s).ok_or_else(|| {
                    LedgerError::Store(format!("invalid verification_status: {s}"))
                })
            })
            .transpose()?;
        let verification_confidence = self
            .verification_confidence
            .as_deref()
            .map(|s| {
                Confidence::parse(s).ok_or_else(|| {
                    LedgerError::Store(format!("invalid verification_confidence: {s}"))
                })
            })
            .transpose()?;

        Ok(LedgerEntry {
            id: self.id,
            height: u64::try_from(self.height)
                .map_err(|_| LedgerError::Store(format!("negative height: {}", self.height)))?,
            statement: self.statement,
            speaker: self.speaker,
            source_url: self.source_url,
            statement_date: self.statement_date,
            statement_fingerprint: self.statement_fingerprint,
            previous_hash: self.previous_hash,
            block_fingerprint: self.block_fingerprint,
            verification_status,
            verification_confidence,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
