//! Structured API error responses with error codes
//!
//! Every error body carries a human-readable `error` string plus a stable
//! machine-readable `code`. The code is repeated in the `x-error-code`
//! header.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::infra::LedgerError;
use crate::oracle::OracleError;

// ============================================================================
// Error Codes
// ============================================================================

/// Error codes for API responses
///
/// These codes are stable and can be used by clients for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (3xxx)
    /// Request body is malformed or has the wrong shape
    InvalidRequestBody,
    /// Field value is invalid
    InvalidFieldValue,

    // Resource errors (4xxx)
    /// No route matches the request
    ResourceNotFound,
    /// Ledger entry not found
    StatementNotFound,

    // Conflict errors (5xxx)
    /// Append lost the race for the tail too many times
    ChainConflict,

    // Infrastructure errors (8xxx)
    /// Store operation failed
    StoreError,
    /// Completion oracle unreachable or timed out
    OracleUnavailable,
    /// Completion oracle answered with an error status
    OracleError,
    /// Completion oracle answered with an unexpected envelope
    OracleMalformedResponse,
    /// No completion oracle configured
    OracleNotConfigured,
    /// Internal server error
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn numeric_code(&self) -> u32 {
        match self {
            ErrorCode::InvalidRequestBody => 3001,
            ErrorCode::InvalidFieldValue => 3003,

            ErrorCode::ResourceNotFound => 4001,
            ErrorCode::StatementNotFound => 4002,

            ErrorCode::ChainConflict => 5001,

            ErrorCode::StoreError => 8001,
            ErrorCode::OracleUnavailable => 8101,
            ErrorCode::OracleError => 8102,
            ErrorCode::OracleMalformedResponse => 8103,
            ErrorCode::OracleNotConfigured => 8104,
            ErrorCode::InternalError => 8999,
        }
    }

    /// Get the HTTP status code for this error
    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidRequestBody => StatusCode::BAD_REQUEST,
            ErrorCode::InvalidFieldValue => StatusCode::BAD_REQUEST,

            ErrorCode::ResourceNotFound => StatusCode::NOT_FOUND,
            ErrorCode::StatementNotFound => StatusCode::NOT_FOUND,

            ErrorCode::ChainConflict => StatusCode::CONFLICT,

            ErrorCode::StoreError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::OracleUnavailable => StatusCode::BAD_GATEWAY,
            ErrorCode::OracleError => StatusCode::BAD_GATEWAY,
            ErrorCode::OracleMalformedResponse => StatusCode::BAD_GATEWAY,
            ErrorCode::OracleNotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code_str = match self {
            ErrorCode::InvalidRequestBody => "INVALID_REQUEST_BODY",
            ErrorCode::InvalidFieldValue => "INVALID_FIELD_VALUE",
            ErrorCode::ResourceNotFound => "RESOURCE_NOT_FOUND",
            ErrorCode::StatementNotFound => "STATEMENT_NOT_FOUND",
            ErrorCode::ChainConflict => "CHAIN_CONFLICT",
            ErrorCode::StoreError => "STORE_ERROR",
            ErrorCode::OracleUnavailable => "ORACLE_UNAVAILABLE",
            ErrorCode::OracleError => "ORACLE_ERROR",
            ErrorCode::OracleMalformedResponse => "ORACLE_MALFORMED_RESPONSE",
            ErrorCode::OracleNotConfigured => "ORACLE_NOT_CONFIGURED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        };
        write!(f, "{}", code_str)
    }
}

// ============================================================================
// Structured Error Response
// ============================================================================

/// Structured error response for API endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Human-readable error message
    pub error: String,

    /// Machine-readable error code
    pub code: ErrorCode,

    /// Numeric error code for easy categorization
    pub numeric_code: u32,

    /// Additional error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code,
            numeric_code: code.numeric_code(),
            details: None,
        }
    }

    /// Set additional details
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Get the HTTP status code
    pub fn status(&self) -> StatusCode {
        self.code.http_status()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code_str = self.code.to_string();
        let mut response = (status, Json(self)).into_response();

        if let Ok(code_value) = HeaderValue::from_str(&code_str) {
            response.headers_mut().insert(
                axum::http::header::HeaderName::from_static("x-error-code"),
                code_value,
            );
        }

        response
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Validation(msg) => ApiError::new(ErrorCode::InvalidFieldValue, msg),
            LedgerError::Database(e) => {
                tracing::error!(error = %e, "Database error");
                ApiError::new(ErrorCode::StoreError, "Store operation failed")
            }
            LedgerError::Store(msg) => {
                tracing::error!(error = %msg, "Store error");
                ApiError::new(ErrorCode::StoreError, "Store operation failed")
            }
            LedgerError::EntryNotFound(id) => ApiError::new(
                ErrorCode::StatementNotFound,
                format!("Statement not found: {}", id),
            )
            .with_details(serde_json::json!({ "statementId": id })),
            LedgerError::ChainConflict { attempts } => ApiError::new(
                ErrorCode::ChainConflict,
                "Ledger tail kept moving under concurrent appends; retry the request",
            )
            .with_details(serde_json::json!({ "attempts": attempts })),
            LedgerError::Oracle(e) => ApiError::from(e),
            LedgerError::OracleNotConfigured => ApiError::new(
                ErrorCode::OracleNotConfigured,
                "Statement verification is not configured",
            ),
            LedgerError::Configuration(msg) | LedgerError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                ApiError::new(ErrorCode::InternalError, "Internal server error")
            }
        }
    }
}

impl From<OracleError> for ApiError {
    fn from(err: OracleError) -> Self {
        match err {
            OracleError::Unavailable(msg) => ApiError::new(
                ErrorCode::OracleUnavailable,
                format!("Completion service unavailable: {}", msg),
            ),
            OracleError::Status { status, .. } => ApiError::new(
                ErrorCode::OracleError,
                format!("Completion service returned status {}", status),
            )
            .with_details(serde_json::json!({ "upstreamStatus": status })),
            OracleError::MalformedResponse(msg) => ApiError::new(
                ErrorCode::OracleMalformedResponse,
                format!("Completion service response was malformed: {}", msg),
            ),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::new(ErrorCode::InvalidRequestBody, rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::new(ErrorCode::InvalidFieldValue, rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::new(ErrorCode::InvalidFieldValue, rejection.body_text())
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Create a validation error with field details
pub fn validation_error(field: &str, message: impl Into<String>) -> ApiError {
    ApiError::new(ErrorCode::InvalidFieldValue, message.into())
        .with_details(serde_json::json!({ "field": field }))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_ledger_error_status_mapping() {
        let cases = [
            (LedgerError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (LedgerError::Store("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (LedgerError::EntryNotFound(Uuid::nil()), StatusCode::NOT_FOUND),
            (LedgerError::ChainConflict { attempts: 6 }, StatusCode::CONFLICT),
            (
                LedgerError::Oracle(OracleError::Unavailable("x".into())),
                StatusCode::BAD_GATEWAY,
            ),
            (
                LedgerError::Oracle(OracleError::MalformedResponse("x".into())),
                StatusCode::BAD_GATEWAY,
            ),
            (LedgerError::OracleNotConfigured, StatusCode::SERVICE_UNAVAILABLE),
            (LedgerError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_store_details_are_not_leaked() {
        let error = ApiError::from(LedgerError::Store("password=hunter2".into()));
        assert_eq!(error.code, ErrorCode::StoreError);
        assert!(!error.error.contains("hunter2"));
    }

    #[test]
    fn test_error_serialization() {
        let error = ApiError::from(LedgerError::Validation("statement must not be empty".into()));
        let json = serde_json::to_value(&error).unwrap();

        assert_eq!(json["error"], "statement must not be empty");
        assert_eq!(json["code"], "INVALID_FIELD_VALUE");
        assert_eq!(json["numeric_code"], 3003);
        assert!(json.get("details").is_none());
    }

    #[test]
    fn test_error_code_header() {
        let response = ApiError::from(LedgerError::ChainConflict { attempts: 3 }).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(response.headers()["x-error-code"], "CHAIN_CONFLICT");
    }

    #[test]
    fn test_error_display() {
        assert_eq!(ErrorCode::StatementNotFound.to_string(), "STATEMENT_NOT_FOUND");
        assert_eq!(
            ErrorCode::OracleNotConfigured.to_string(),
            serde_json::to_value(ErrorCode::OracleNotConfigured).unwrap()
        );
    }

    #[test]
    fn test_validation_error_helper() {
        let error = validation_error("limit", "limit must be positive");
        assert_eq!(error.code, ErrorCode::InvalidFieldValue);
        assert_eq!(error.details.unwrap()["field"], "limit");
    }
}
