// ============================================================================
// HTTP ROUTES
// ============================================================================
//
// Route Organization:
// - wallet.rs:   Account join + balance lookups (public)
// - withdraw.rs: Withdrawal requests (public)
// - rewards.rs:  Ad-network postbacks, referral events, task claims
// - admin.rs:    Operator settlement actions (x-admin-token guarded)

pub mod admin;
pub mod rewards;
pub mod wallet;
pub mod withdraw;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::rewards::RewardService;
use crate::settlement::AdminSettlement;
use crate::storage::LedgerStore;
use crate::withdrawal::WithdrawalRouter;

/// Shared handler state. Clone is cheap (Arc handles all the way down).
#[derive(Clone)]
pub struct AppState {
    pub store: LedgerStore,
    pub withdrawals: Arc<WithdrawalRouter>,
    pub settlement: Arc<AdminSettlement>,
    pub rewards: Arc<RewardService>,
    pub config: Arc<Config>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Account lifecycle + balances
        .route("/join", post(wallet::join))
        .route("/balance", post(wallet::balance))
        // Withdrawals
        .route("/withdraw", post(withdraw::request_withdrawal))
        // Reward crediting
        .route(
            "/ad-reward",
            get(rewards::ad_reward_get).post(rewards::ad_reward_post),
        )
        .route("/referral-event", post(rewards::referral_event))
        .route("/claim-reward", post(rewards::claim_reward))
        // Operator settlement
        .route(
            "/admin/withdrawals/:id/approve",
            post(admin::approve_withdrawal),
        )
        .route(
            "/admin/withdrawals/:id/reject",
            post(admin::reject_withdrawal),
        )
        .route("/admin/withdrawals/pending", get(admin::pending_withdrawals))
        // Health
        .route("/health", get(wallet::health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
