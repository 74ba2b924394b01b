// ============================================================================
// REWARD SERVICE - referral, ad-view and task crediting
// ============================================================================
//
// All crediting paths are idempotent:
// - referral: once per (referrer, referred) pair, the referral list is the
//   dedup set
// - ad view: once per dedup key; the key is the network's impression id
//   when it sends one, otherwise a hash of (user, token, time window) so a
//   replayed postback URL inside the window cannot double-credit
// - task: once per task id per account

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{LedgerError, LedgerResult};
use crate::model::Account;
use crate::notify::{notify_user_detached, Notifier};
use crate::storage::LedgerStore;

pub struct RewardService {
    store: LedgerStore,
    notifier: Arc<dyn Notifier>,
    config: Config,
}

impl RewardService {
    pub fn new(store: LedgerStore, notifier: Arc<dyn Notifier>, config: Config) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    /// Credit the referrer for a confirmed join. Duplicate deliveries and
    /// unknown referrers are absorbed silently; a join must never fail
    /// because its referral bonus could not be credited.
    pub fn credit_referral(
        &self,
        referrer_id: &str,
        referred_user_id: &str,
        display_name: &str,
        photo_ref: Option<String>,
    ) {
        if referrer_id == referred_user_id {
            warn!(user_id = %referrer_id, "Self-referral ignored");
            return;
        }

        match self.store.credit_referral(
            referrer_id,
            referred_user_id,
            display_name,
            photo_ref,
            self.config.referral_reward,
        ) {
            Ok(true) => {
                notify_user_detached(
                    self.notifier.clone(),
                    referrer_id.to_string(),
                    format!(
                        "🎉 {} joined through your link! +{} 💎",
                        display_name, self.config.referral_reward
                    ),
                );
            }
            Ok(false) => {}
            Err(e) => {
                warn!(referrer_id = %referrer_id, error = %e, "Referral credit failed");
            }
        }
    }

    /// Credit a verified ad view reported by the ad network's
    /// server-to-server postback. The shared secret gates the endpoint;
    /// the dedup key makes replays inert.
    pub fn credit_ad_reward(
        &self,
        user_id: &str,
        token: &str,
        impression_id: Option<&str>,
    ) -> LedgerResult<Account> {
        if self.config.ad_postback_secret.is_empty()
            || token != self.config.ad_postback_secret
        {
            return Err(LedgerError::Unauthorized);
        }
        if user_id.is_empty() {
            return Err(LedgerError::Validation("userId is required".to_string()));
        }

        let dedup_key = match impression_id.filter(|id| !id.is_empty()) {
            Some(id) => format!("imp:{}", id),
            None => self.windowed_dedup_key(user_id, token),
        };

        let account = self
            .store
            .credit_ad_reward(user_id, &dedup_key, self.config.ad_reward)?;
        info!(user_id = %user_id, "Ad view credited");
        Ok(account)
    }

    /// Credit a completed-task reward, once per task id. The amount comes
    /// from the client, so it is clamped against a configured ceiling.
    pub fn claim_task_reward(
        &self,
        user_id: &str,
        task_id: &str,
        amount: f64,
    ) -> LedgerResult<Account> {
        if user_id.is_empty() || task_id.is_empty() {
            return Err(LedgerError::Validation(
                "userId and taskId are required".to_string(),
            ));
        }
        if amount <= 0.0 || !amount.is_finite() || amount > self.config.max_task_reward {
            return Err(LedgerError::Validation(format!(
                "reward amount must be in (0, {}]",
                self.config.max_task_reward
            )));
        }

        self.store.claim_task_reward(user_id, task_id, amount)
    }

    /// Fallback dedup key when the ad network omits an impression id:
    /// identical postbacks inside one time window collapse to one key.
    fn windowed_dedup_key(&self, user_id: &str, token: &str) -> String {
        let window = unix_now() / self.config.ad_replay_window_secs.max(1);
        let mut hasher = Sha256::new();
        hasher.update(user_id.as_bytes());
        hasher.update(b"|");
        hasher.update(token.as_bytes());
        hasher.update(b"|");
        hasher.update(window.to_string().as_bytes());
        format!("win:{}", hex::encode(hasher.finalize()))
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
