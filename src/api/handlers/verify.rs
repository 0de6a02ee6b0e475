//! Statement verification handler.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::VerifyRequest;
use crate::domain::VerificationReport;
use crate::server::AppState;

/// POST /api/v1/verify - Judge a stored entry or an ad hoc claim.
pub async fn verify_statement(
    State(state): State<AppState>,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Json<VerificationReport>, ApiError> {
    let Json(request) = payload?;
    let report = match request {
        VerifyRequest::Stored(reference) => {
            state.verifier.verify_entry(reference.statement_id).await?
        }
        VerifyRequest::AdHoc(claim) => state.verifier.verify(&claim).await?,
    };
    Ok(Json(report))
}
