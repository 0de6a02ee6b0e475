//! Ledger statement handlers.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{
    AppendRequest, AppendResponse, ListQuery, StatementsResponse, DEFAULT_LIST_LIMIT,
    MAX_LIST_LIMIT,
};
use crate::domain::LedgerEntry;
use crate::infra::LedgerError;
use crate::server::AppState;

/// POST /api/v1/statements - Append a statement to the chain.
pub async fn append_statement(
    State(state): State<AppState>,
    payload: Result<Json<AppendRequest>, JsonRejection>,
) -> Result<Json<AppendResponse>, ApiError> {
    let Json(request) = payload?;
    let entry = state.linker.append(request).await?;
    Ok(Json(AppendResponse::new(entry)))
}

/// GET /api/v1/statements - Most recent statements, newest first.
pub async fn list_statements(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<StatementsResponse>, ApiError> {
    let Query(query) = query?;
    let limit = query.effective_limit(DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT);

    if limit == 0 {
        return Ok(Json(StatementsResponse {
            entries: Vec::new(),
            count: 0,
        }));
    }

    let entries = state.store.recent(limit).await?;
    Ok(Json(StatementsResponse {
        count: entries.len(),
        entries,
    }))
}

/// GET /api/v1/statements/:id - Read one ledger entry.
pub async fn get_statement(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<LedgerEntry>, ApiError> {
    let Path(id) = id?;
    let entry = state
        .store
        .get_by_id(id)
        .await?
        .ok_or(LedgerError::EntryNotFound(id))?;
    Ok(Json(entry))
}
