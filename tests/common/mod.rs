// ============================================================================
// TEST HELPERS - scripted gateway, recording notifier, store fixtures
// ============================================================================

// Not every test binary uses every helper
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use pocket_ledger::{
    Config, Currency, Destination, LedgerStore, Mutation, Notifier, PaymentGateway,
    TransferOutcome, WithdrawalRequest,
};

/// Gateway that replays a scripted sequence of outcomes and counts calls.
pub struct ScriptedGateway {
    outcomes: Mutex<VecDeque<TransferOutcome>>,
    pub calls: AtomicUsize,
}

impl ScriptedGateway {
    pub fn new(outcomes: Vec<TransferOutcome>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn transfer(
        &self,
        _destination: &Destination,
        _amount: f64,
        _memo: &str,
    ) -> TransferOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(TransferOutcome::Ambiguous)
    }
}

/// Notifier that records everything it is asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    pub operator_messages: Mutex<Vec<(String, Option<WithdrawalRequest>)>>,
    pub user_messages: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn operator_count(&self) -> usize {
        self.operator_messages.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_operator(
        &self,
        text: &str,
        request: Option<&WithdrawalRequest>,
    ) -> Result<(), String> {
        self.operator_messages
            .lock()
            .unwrap()
            .push((text.to_string(), request.cloned()));
        Ok(())
    }

    async fn notify_user(&self, user_id: &str, text: &str) -> Result<(), String> {
        self.user_messages
            .lock()
            .unwrap()
            .push((user_id.to_string(), text.to_string()));
        Ok(())
    }
}

pub fn test_config() -> Config {
    Config {
        bind_addr: "127.0.0.1:0".to_string(),
        data_path: String::new(),
        auto_payout_limit: 0.5,
        referral_reward: 2.0,
        ad_reward: 0.5,
        max_task_reward: 100.0,
        ad_replay_window_secs: 600,
        ad_postback_secret: "postback-secret".to_string(),
        admin_token: "test-admin-token".to_string(),
        gateway_url: "http://gateway.test/transfer".to_string(),
        gateway_api_key: String::new(),
        gateway_timeout_secs: 5,
        bot_token: String::new(),
        operator_chat_id: String::new(),
    }
}

pub fn open_store() -> (TempDir, LedgerStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = LedgerStore::open(dir.path().to_str().unwrap()).unwrap();
    (dir, store)
}

/// Account with funds on both balances and some diamonds.
pub fn funded_account(store: &LedgerStore, user_id: &str, crypto: f64, fiat: f64, diamonds: f64) {
    store.ensure_account(user_id, "Test User", None, None).unwrap();
    store
        .apply_conditional(
            user_id,
            &[],
            &[
                Mutation::AdjustCrypto(crypto),
                Mutation::AdjustFiat(fiat),
                Mutation::AdjustDiamonds(diamonds),
            ],
        )
        .unwrap();
}

pub fn ton_destination() -> Destination {
    Destination {
        method: "ton".to_string(),
        address: "EQC0ffee".to_string(),
    }
}

pub fn bkash_destination() -> Destination {
    Destination {
        method: "bkash".to_string(),
        address: "01700000000".to_string(),
    }
}

pub fn crypto() -> Currency {
    Currency::Crypto
}

pub fn fiat() -> Currency {
    Currency::Fiat
}
