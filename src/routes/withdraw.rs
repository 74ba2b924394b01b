// ============================================================================
// WITHDRAWAL ROUTES
// ============================================================================

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::LedgerResult;
use crate::model::{Currency, Destination};

use super::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawRequest {
    pub user_id: String,
    pub amount: f64,
    pub currency: Currency,
    pub destination: Destination,
    #[serde(default)]
    pub diamond_fee: f64,
}

/// POST /withdraw - reserve funds and route to auto-payout or manual
/// review. An ambiguous gateway outcome surfaces as 202: the request is
/// parked Pending for operator reconciliation.
pub async fn request_withdrawal(
    State(state): State<AppState>,
    Json(req): Json<WithdrawRequest>,
) -> LedgerResult<Json<Value>> {
    let outcome = state
        .withdrawals
        .request_withdrawal(
            &req.user_id,
            req.amount,
            req.currency,
            req.destination,
            req.diamond_fee,
        )
        .await?;

    Ok(Json(json!({
        "success": true,
        "requestId": outcome.request_id,
        "status": outcome.status,
    })))
}
