// ============================================================================
// LEDGER ERROR TAXONOMY
// ============================================================================
//
// Every fallible operation in the core returns LedgerError. The taxonomy
// separates caller mistakes (Validation, Unauthorized), business-rule
// rejections (PreconditionFailed, AlreadyProcessed, NotFound), transient
// store trouble (StoreConflict) and the one outcome that must never be
// auto-resolved (AmbiguousExternalResult).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    /// Malformed or missing input - rejected before touching the store
    #[error("invalid request: {0}")]
    Validation(String),

    /// Insufficient balance/diamonds - rejected, no mutation applied
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// Unknown account or withdrawal request id
    #[error("not found: {0}")]
    NotFound(String),

    /// Terminal-state withdrawal re-targeted by a duplicate settle action
    #[error("already processed: {0}")]
    AlreadyProcessed(String),

    /// Payment gateway outcome unknown - request parked for reconciliation
    #[error("external transfer outcome unknown, request held for reconciliation")]
    AmbiguousExternalResult,

    /// Conflicting concurrent writers exhausted the local retry budget
    #[error("store conflict, try again")]
    StoreConflict,

    /// Bad shared secret or admin token
    #[error("unauthorized")]
    Unauthorized,

    /// Underlying storage failure (corrupt record, I/O error)
    #[error("storage error: {0}")]
    Storage(String),
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let status = match &self {
            LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
            LedgerError::Unauthorized => StatusCode::UNAUTHORIZED,
            LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
            LedgerError::PreconditionFailed(_) => StatusCode::CONFLICT,
            LedgerError::AlreadyProcessed(_) => StatusCode::CONFLICT,
            // The transfer may still land; the caller gets an explicit
            // "accepted, pending reconciliation" rather than a failure.
            LedgerError::AmbiguousExternalResult => StatusCode::ACCEPTED,
            LedgerError::StoreConflict => StatusCode::SERVICE_UNAVAILABLE,
            LedgerError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(serde_json::json!({
            "success": false,
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}
