// ============================================================================
// ADMIN ROUTES - operator settlement (x-admin-token guarded)
// ============================================================================

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use crate::error::{LedgerError, LedgerResult};

use super::AppState;

/// Constant-path token check on every admin route
fn require_admin(state: &AppState, headers: &HeaderMap) -> LedgerResult<()> {
    let presented = headers
        .get("x-admin-token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if presented.is_empty() || presented != state.config.admin_token {
        return Err(LedgerError::Unauthorized);
    }
    Ok(())
}

/// POST /admin/withdrawals/:id/approve - settle a pending request as paid.
/// Repeated button presses hit AlreadyProcessed and change nothing.
pub async fn approve_withdrawal(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> LedgerResult<Json<Value>> {
    require_admin(&state, &headers)?;
    let request = state.settlement.approve(&id)?;

    Ok(Json(json!({
        "success": true,
        "requestId": request.id,
        "status": request.status,
    })))
}

/// POST /admin/withdrawals/:id/reject - settle a pending request as
/// rejected; refund happens atomically with the status flip.
pub async fn reject_withdrawal(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> LedgerResult<Json<Value>> {
    require_admin(&state, &headers)?;
    let request = state.settlement.reject(&id)?;

    Ok(Json(json!({
        "success": true,
        "requestId": request.id,
        "status": request.status,
    })))
}

/// GET /admin/withdrawals/pending - open requests, oldest first
pub async fn pending_withdrawals(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> LedgerResult<Json<Value>> {
    require_admin(&state, &headers)?;
    let pending = state.store.pending_withdrawals()?;

    Ok(Json(json!({
        "success": true,
        "count": pending.len(),
        "withdrawals": pending,
    })))
}
