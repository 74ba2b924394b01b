// ============================================================================
// CONFIGURATION - Loaded once at startup, passed explicitly
// ============================================================================
//
// Thresholds, reward amounts and secrets live here instead of ambient
// globals. Product has changed the reward values between releases, so
// nothing in the core hard-codes them.

use tracing::{info, warn};

/// Development-only admin token. Override POCKET_ADMIN_TOKEN in production.
const DEFAULT_ADMIN_TOKEN: &str = "dev-admin-token";

#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP bind address
    pub bind_addr: String,
    /// ReDB data directory
    pub data_path: String,

    /// Withdrawals at or below this amount in crypto are paid automatically
    pub auto_payout_limit: f64,
    /// Diamonds awarded to a referrer per confirmed join
    pub referral_reward: f64,
    /// Diamonds credited per verified ad view
    pub ad_reward: f64,
    /// Upper bound accepted from the task-reward claim endpoint
    pub max_task_reward: f64,
    /// Window within which a plain duplicate-URL ad postback replay is
    /// rejected when the network supplies no impression id (seconds)
    pub ad_replay_window_secs: u64,

    /// Shared secret expected on ad-network postbacks
    pub ad_postback_secret: String,
    /// Shared token for admin settle actions
    pub admin_token: String,

    /// Payment gateway endpoint; empty disables auto-payout entirely
    /// (every withdrawal routes to manual review)
    pub gateway_url: String,
    pub gateway_api_key: String,
    /// Gateway call timeout (seconds). A timed-out transfer is ambiguous,
    /// not failed.
    pub gateway_timeout_secs: u64,

    /// Telegram bot credentials for operator/user notifications;
    /// empty token disables outbound notifications
    pub bot_token: String,
    pub operator_chat_id: String,
}

impl Config {
    /// Read configuration from the environment, falling back to
    /// development defaults.
    pub fn from_env() -> Self {
        let cfg = Self {
            bind_addr: env_or("POCKET_BIND_ADDR", "0.0.0.0:8080"),
            data_path: env_or("POCKET_DATA_PATH", "./ledger_data"),
            auto_payout_limit: env_f64("POCKET_AUTO_PAYOUT_LIMIT", 0.5),
            referral_reward: env_f64("POCKET_REFERRAL_REWARD", 2.0),
            ad_reward: env_f64("POCKET_AD_REWARD", 0.5),
            max_task_reward: env_f64("POCKET_MAX_TASK_REWARD", 100.0),
            ad_replay_window_secs: env_f64("POCKET_AD_REPLAY_WINDOW_SECS", 600.0) as u64,
            ad_postback_secret: env_or("POCKET_AD_SECRET", ""),
            admin_token: env_or("POCKET_ADMIN_TOKEN", DEFAULT_ADMIN_TOKEN),
            gateway_url: env_or("POCKET_GATEWAY_URL", ""),
            gateway_api_key: env_or("POCKET_GATEWAY_API_KEY", ""),
            gateway_timeout_secs: env_f64("POCKET_GATEWAY_TIMEOUT_SECS", 20.0) as u64,
            bot_token: env_or("POCKET_BOT_TOKEN", ""),
            operator_chat_id: env_or("POCKET_OPERATOR_CHAT_ID", ""),
        };

        if cfg.admin_token == DEFAULT_ADMIN_TOKEN {
            warn!("POCKET_ADMIN_TOKEN not set, using development default");
        }
        if cfg.ad_postback_secret.is_empty() {
            warn!("POCKET_AD_SECRET not set, ad postbacks will be rejected");
        }
        info!(
            auto_payout_limit = cfg.auto_payout_limit,
            referral_reward = cfg.referral_reward,
            ad_reward = cfg.ad_reward,
            auto_payout = cfg.auto_payout_enabled(),
            "Configuration loaded"
        );

        cfg
    }

    /// Auto-payout requires a configured gateway
    pub fn auto_payout_enabled(&self) -> bool {
        !self.gateway_url.is_empty()
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
