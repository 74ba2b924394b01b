// ============================================================================
// WALLET ROUTES - join, balance, health
// ============================================================================

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{LedgerError, LedgerResult};

use super::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub referred_by: Option<String>,
}

/// POST /join - idempotent account creation. The join event may be
/// delivered more than once; only the first delivery creates the account
/// and triggers the referral credit.
pub async fn join(
    State(state): State<AppState>,
    Json(req): Json<JoinRequest>,
) -> LedgerResult<Json<Value>> {
    let (account, created) = state.store.ensure_account(
        &req.user_id,
        &req.name,
        req.username.clone(),
        req.referred_by.clone(),
    )?;

    // Referral crediting only on first contact, and only with the referrer
    // the account was actually created with (self/empty already filtered)
    if created {
        if let Some(referrer) = &account.referred_by {
            state
                .rewards
                .credit_referral(referrer, &account.user_id, &account.name, None);
        }
    }

    Ok(Json(json!({
        "success": true,
        "created": created,
        "userId": account.user_id,
        "diamonds": account.diamonds,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceRequest {
    pub user_id: String,
}

/// POST /balance - current balances for one account
pub async fn balance(
    State(state): State<AppState>,
    Json(req): Json<BalanceRequest>,
) -> LedgerResult<Json<Value>> {
    let account = state
        .store
        .get_account(&req.user_id)
        .ok_or_else(|| LedgerError::NotFound(format!("account {}", req.user_id)))?;

    Ok(Json(json!({
        "success": true,
        "userId": account.user_id,
        "balanceFiat": account.balance_fiat,
        "balanceCrypto": account.balance_crypto,
        "diamonds": account.diamonds,
    })))
}

/// GET /health - liveness + store stats
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "pocket-ledger",
        "store": state.store.stats(),
    }))
}
