// ============================================================================
// REWARD ROUTES - ad postbacks, referral events, task claims
// ============================================================================

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::LedgerResult;

use super::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdRewardParams {
    pub user_id: String,
    pub token: String,
    #[serde(default)]
    pub impression_id: Option<String>,
}

/// GET /ad-reward - ad networks deliver server-to-server postbacks as
/// plain GET requests with query parameters.
pub async fn ad_reward_get(
    State(state): State<AppState>,
    Query(params): Query<AdRewardParams>,
) -> LedgerResult<Json<Value>> {
    credit_ad(state, params)
}

/// POST /ad-reward - same postback as JSON body
pub async fn ad_reward_post(
    State(state): State<AppState>,
    Json(params): Json<AdRewardParams>,
) -> LedgerResult<Json<Value>> {
    credit_ad(state, params)
}

fn credit_ad(state: AppState, params: AdRewardParams) -> LedgerResult<Json<Value>> {
    let account = state.rewards.credit_ad_reward(
        &params.user_id,
        &params.token,
        params.impression_id.as_deref(),
    )?;

    Ok(Json(json!({
        "success": true,
        "userId": account.user_id,
        "diamonds": account.diamonds,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralEvent {
    pub referrer_id: String,
    pub referred_user_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub photo_ref: Option<String>,
}

/// POST /referral-event - at-least-once join notification. Always
/// acknowledged: duplicates and unknown referrers are absorbed so the
/// sender never retries forever.
pub async fn referral_event(
    State(state): State<AppState>,
    Json(event): Json<ReferralEvent>,
) -> Json<Value> {
    let display_name = event
        .display_name
        .unwrap_or_else(|| event.referred_user_id.clone());
    state.rewards.credit_referral(
        &event.referrer_id,
        &event.referred_user_id,
        &display_name,
        event.photo_ref,
    );

    Json(json!({ "success": true }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRewardRequest {
    pub user_id: String,
    pub task_id: String,
    pub reward_amount: f64,
}

/// POST /claim-reward - completed-task payout, once per task id
pub async fn claim_reward(
    State(state): State<AppState>,
    Json(req): Json<ClaimRewardRequest>,
) -> LedgerResult<Json<Value>> {
    let account =
        state
            .rewards
            .claim_task_reward(&req.user_id, &req.task_id, req.reward_amount)?;

    Ok(Json(json!({
        "success": true,
        "userId": account.user_id,
        "balanceFiat": account.balance_fiat,
    })))
}
