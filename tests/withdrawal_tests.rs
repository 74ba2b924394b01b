// ============================================================================
// WITHDRAWAL FLOW TESTS - routing, two-phase auto-payout, reservation
// ============================================================================

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use pocket_ledger::{
    LedgerError, TransferOutcome, WithdrawalRouter, WithdrawalStatus,
};

fn router(
    store: &pocket_ledger::LedgerStore,
    gateway: Arc<ScriptedGateway>,
    notifier: Arc<RecordingNotifier>,
) -> WithdrawalRouter {
    WithdrawalRouter::new(store.clone(), gateway, notifier, test_config())
}

/// Detached notifications run on spawned tasks; give them a beat.
async fn settle_spawned() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn auto_payout_success_settles_paid() {
    let (_dir, store) = open_store();
    funded_account(&store, "u1", 2.0, 0.0, 1.0);

    let gateway = ScriptedGateway::new(vec![TransferOutcome::Success {
        reference: "tx-abc".to_string(),
    }]);
    let router = router(&store, gateway.clone(), RecordingNotifier::new());

    let outcome = router
        .request_withdrawal("u1", 0.25, crypto(), ton_destination(), 0.5)
        .await
        .unwrap();

    assert_eq!(outcome.status, WithdrawalStatus::Paid);
    assert_eq!(gateway.call_count(), 1);

    let request = store.get_withdrawal(&outcome.request_id).unwrap();
    assert_eq!(request.gateway_tx.as_deref(), Some("tx-abc"));

    // Funds stay deducted after a successful payout
    let acc = store.get_account("u1").unwrap();
    assert_eq!(acc.balance_crypto, 1.75);
    assert_eq!(acc.diamonds, 0.5);
}

#[tokio::test]
async fn auto_payout_failure_refunds_and_rejects() {
    let (_dir, store) = open_store();
    funded_account(&store, "u1", 2.0, 0.0, 1.0);

    let gateway = ScriptedGateway::new(vec![TransferOutcome::Failure {
        reason: "invalid address".to_string(),
    }]);
    let router = router(&store, gateway.clone(), RecordingNotifier::new());

    let outcome = router
        .request_withdrawal("u1", 0.25, crypto(), ton_destination(), 0.5)
        .await
        .unwrap();

    assert_eq!(outcome.status, WithdrawalStatus::Rejected);
    assert_eq!(gateway.call_count(), 1);

    // Confirmed failure refunds amount and fee in full
    let acc = store.get_account("u1").unwrap();
    assert_eq!(acc.balance_crypto, 2.0);
    assert_eq!(acc.diamonds, 1.0);
}

#[tokio::test]
async fn auto_payout_ambiguous_parks_without_refund() {
    let (_dir, store) = open_store();
    funded_account(&store, "u1", 2.0, 0.0, 1.0);

    let gateway = ScriptedGateway::new(vec![TransferOutcome::Ambiguous]);
    let notifier = RecordingNotifier::new();
    let router = router(&store, gateway.clone(), notifier.clone());

    let result = router
        .request_withdrawal("u1", 0.25, crypto(), ton_destination(), 0.5)
        .await;
    assert!(matches!(result, Err(LedgerError::AmbiguousExternalResult)));
    assert_eq!(gateway.call_count(), 1);

    // The hold stays in place: the transfer may still land
    let acc = store.get_account("u1").unwrap();
    assert_eq!(acc.balance_crypto, 1.75);
    assert_eq!(acc.diamonds, 0.5);

    let pending = store.pending_withdrawals().unwrap();
    assert_eq!(pending.len(), 1);
    assert!(pending[0].awaiting_reconciliation);

    settle_spawned().await;
    assert_eq!(notifier.operator_count(), 1);
}

#[tokio::test]
async fn manual_path_reserves_without_transfer() {
    let (_dir, store) = open_store();
    funded_account(&store, "u1", 0.0, 500.0, 2.0);

    let gateway = ScriptedGateway::new(vec![]);
    let notifier = RecordingNotifier::new();
    let router = router(&store, gateway.clone(), notifier.clone());

    // Fiat never auto-pays regardless of amount
    let outcome = router
        .request_withdrawal("u1", 100.0, fiat(), bkash_destination(), 1.0)
        .await
        .unwrap();

    assert_eq!(outcome.status, WithdrawalStatus::Pending);
    assert_eq!(gateway.call_count(), 0);

    let acc = store.get_account("u1").unwrap();
    assert_eq!(acc.balance_fiat, 400.0);
    assert_eq!(acc.diamonds, 1.0);

    settle_spawned().await;
    assert_eq!(notifier.operator_count(), 1);
    let messages = notifier.operator_messages.lock().unwrap();
    let attached = messages[0].1.as_ref().unwrap();
    assert_eq!(attached.id, outcome.request_id);
}

#[tokio::test]
async fn crypto_above_limit_routes_manual() {
    let (_dir, store) = open_store();
    funded_account(&store, "u1", 10.0, 0.0, 2.0);

    let gateway = ScriptedGateway::new(vec![]);
    let router = router(&store, gateway.clone(), RecordingNotifier::new());

    // 0.5 is the auto limit; 0.75 must go to review
    let outcome = router
        .request_withdrawal("u1", 0.75, crypto(), ton_destination(), 0.5)
        .await
        .unwrap();

    assert_eq!(outcome.status, WithdrawalStatus::Pending);
    assert_eq!(gateway.call_count(), 0);
}

#[tokio::test]
async fn disabled_gateway_routes_everything_manual() {
    let (_dir, store) = open_store();
    funded_account(&store, "u1", 2.0, 0.0, 1.0);

    let mut config = test_config();
    config.gateway_url = String::new();
    let gateway = ScriptedGateway::new(vec![TransferOutcome::Success {
        reference: "never".to_string(),
    }]);
    let router = WithdrawalRouter::new(
        store.clone(),
        gateway.clone(),
        RecordingNotifier::new(),
        config,
    );

    let outcome = router
        .request_withdrawal("u1", 0.25, crypto(), ton_destination(), 0.5)
        .await
        .unwrap();

    assert_eq!(outcome.status, WithdrawalStatus::Pending);
    assert_eq!(gateway.call_count(), 0);
}

#[tokio::test]
async fn validation_rejects_before_store_touch() {
    let (_dir, store) = open_store();
    funded_account(&store, "u1", 2.0, 0.0, 1.0);

    let gateway = ScriptedGateway::new(vec![]);
    let router = router(&store, gateway.clone(), RecordingNotifier::new());

    for (amount, fee, dest) in [
        (0.0, 0.5, ton_destination()),
        (-1.0, 0.5, ton_destination()),
        (0.25, -0.5, ton_destination()),
        (
            0.25,
            0.5,
            pocket_ledger::Destination {
                method: "ton".to_string(),
                address: String::new(),
            },
        ),
    ] {
        let result = router
            .request_withdrawal("u1", amount, crypto(), dest, fee)
            .await;
        assert!(matches!(result, Err(LedgerError::Validation(_))));
    }

    // No reservation happened
    assert_eq!(store.get_account("u1").unwrap().balance_crypto, 2.0);
    assert!(store.pending_withdrawals().unwrap().is_empty());
    assert_eq!(gateway.call_count(), 0);
}

#[tokio::test]
async fn insufficient_balance_never_reaches_gateway() {
    let (_dir, store) = open_store();
    funded_account(&store, "u1", 0.1, 0.0, 1.0);

    let gateway = ScriptedGateway::new(vec![TransferOutcome::Success {
        reference: "never".to_string(),
    }]);
    let router = router(&store, gateway.clone(), RecordingNotifier::new());

    let result = router
        .request_withdrawal("u1", 0.25, crypto(), ton_destination(), 0.5)
        .await;
    assert!(matches!(result, Err(LedgerError::PreconditionFailed(_))));
    assert_eq!(gateway.call_count(), 0);
    assert_eq!(store.get_account("u1").unwrap().balance_crypto, 0.1);
}
