//! Chain inspection handlers.

use axum::extract::State;
use axum::Json;

use crate::api::error::ApiError;
use crate::domain::{ChainReport, LedgerEntry};
use crate::server::AppState;

/// GET /api/v1/chain/tail - Current tail entry, or `null` on an empty ledger.
pub async fn chain_tail(
    State(state): State<AppState>,
) -> Result<Json<Option<LedgerEntry>>, ApiError> {
    Ok(Json(state.linker.tail().await?))
}

/// GET /api/v1/chain/verify - Walk the chain and recompute every fingerprint.
pub async fn verify_chain(State(state): State<AppState>) -> Result<Json<ChainReport>, ApiError> {
    Ok(Json(state.linker.verify_chain().await?))
}
