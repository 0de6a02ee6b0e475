//! Chat session handlers.

use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;

use crate::api::error::{validation_error, ApiError};
use crate::api::types::{
    ChatHistoryResponse, ListQuery, PurgeResponse, DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT,
};
use crate::server::AppState;

/// GET /api/v1/chat/:session_id - Session history, oldest first.
pub async fn chat_history(
    State(state): State<AppState>,
    session_id: Result<Path<String>, PathRejection>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<ChatHistoryResponse>, ApiError> {
    let session_id = session_param(session_id?)?;
    let Query(query) = query?;
    let limit = query.effective_limit(DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT);

    let turns = state.chat_log.session_history(&session_id, limit).await?;
    Ok(Json(ChatHistoryResponse {
        session_id,
        count: turns.len(),
        turns,
    }))
}

/// DELETE /api/v1/chat/:session_id - Remove every turn of a session.
pub async fn purge_chat(
    State(state): State<AppState>,
    session_id: Result<Path<String>, PathRejection>,
) -> Result<Json<PurgeResponse>, ApiError> {
    let session_id = session_param(session_id?)?;
    let deleted = state.chat_log.purge_session(&session_id).await?;
    tracing::info!(session_id = %session_id, deleted, "Chat session purged");
    Ok(Json(PurgeResponse {
        session_id,
        deleted,
    }))
}

fn session_param(Path(session_id): Path<String>) -> Result<String, ApiError> {
    let trimmed = session_id.trim();
    if trimmed.is_empty() {
        return Err(validation_error("sessionId", "sessionId must not be empty"));
    }
    Ok(trimmed.to_string())
}
