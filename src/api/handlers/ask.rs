//! Question answering handler.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::AskRequest;
use crate::domain::AskResponse;
use crate::server::AppState;

/// POST /api/v1/ask - Answer a question from ledger content.
pub async fn ask_question(
    State(state): State<AppState>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, ApiError> {
    let Json(request) = payload?;
    let response = state.query.ask(&request.query, request.session()).await?;
    Ok(Json(response))
}
