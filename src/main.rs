// ============================================================================
// POCKET LEDGER SERVER
// ============================================================================
//
// Run:  cargo run
// Test: curl http://localhost:8080/health

use std::sync::Arc;

use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pocket_ledger::{
    build_router, AdminSettlement, AppState, Config, HttpPaymentGateway, LedgerStore,
    NoopNotifier, Notifier, RewardService, TelegramNotifier, WithdrawalRouter,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ========================================================================
    // 1. INITIALIZE LOGGING
    // ========================================================================
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,pocket_ledger=debug")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true),
        )
        .init();

    // ========================================================================
    // 2. CONFIG + STORAGE
    // ========================================================================
    let config = Config::from_env();
    let store = LedgerStore::open(&config.data_path)?;

    // ========================================================================
    // 3. SERVICES
    // ========================================================================
    let notifier: Arc<dyn Notifier> = if config.bot_token.is_empty() {
        warn!("POCKET_BOT_TOKEN not set, notifications disabled");
        Arc::new(NoopNotifier)
    } else {
        Arc::new(TelegramNotifier::new(&config))
    };

    // The gateway client is built unconditionally; with no gateway URL the
    // router sends every withdrawal to manual review and never calls it.
    let gateway = Arc::new(HttpPaymentGateway::new(&config));

    let state = AppState {
        store: store.clone(),
        withdrawals: Arc::new(WithdrawalRouter::new(
            store.clone(),
            gateway,
            notifier.clone(),
            config.clone(),
        )),
        settlement: Arc::new(AdminSettlement::new(store.clone(), notifier.clone())),
        rewards: Arc::new(RewardService::new(store, notifier, config.clone())),
        config: Arc::new(config.clone()),
    };

    // ========================================================================
    // 4. SERVE
    // ========================================================================
    let app = build_router(state);

    info!("🚀 Server listening on http://{}", config.bind_addr);
    info!("📡 ENDPOINTS:");
    info!("   POST /join                            - Idempotent account creation");
    info!("   POST /balance                         - Balance lookup");
    info!("   POST /withdraw                        - Withdrawal request");
    info!("   GET|POST /ad-reward                   - Ad-network postback");
    info!("   POST /referral-event                  - Referral join event");
    info!("   POST /claim-reward                    - Task reward claim");
    info!("   POST /admin/withdrawals/:id/approve   - Settle as paid");
    info!("   POST /admin/withdrawals/:id/reject    - Settle as rejected + refund");
    info!("   GET  /admin/withdrawals/pending       - Open requests");
    info!("   GET  /health                          - Health check");

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("✅ Server shutdown complete");
    Ok(())
}

// ============================================================================
// GRACEFUL SHUTDOWN
// ============================================================================

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    warn!("🛑 Shutdown signal received");
}
