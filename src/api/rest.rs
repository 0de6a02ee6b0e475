//! REST API routes for the statement ledger.

use axum::http::Uri;
use axum::routing::{get, post};
use axum::Router;

use crate::api::error::{ApiError, ErrorCode};
use crate::api::handlers::{
    append_statement, ask_question, chain_tail, chat_history, get_statement, list_statements,
    purge_chat, verify_chain, verify_statement,
};
use crate::server::AppState;

/// Build the `/api` router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/statements", post(append_statement).get(list_statements))
        .route("/v1/statements/:id", get(get_statement))
        .route("/v1/verify", post(verify_statement))
        .route("/v1/ask", post(ask_question))
        // Chain audit
        .route("/v1/chain/tail", get(chain_tail))
        .route("/v1/chain/verify", get(verify_chain))
        // Chat sessions
        .route("/v1/chat/:session_id", get(chat_history).delete(purge_chat))
}

/// Fallback for unmatched routes.
pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::new(
        ErrorCode::ResourceNotFound,
        format!("No route for {}", uri.path()),
    )
}
