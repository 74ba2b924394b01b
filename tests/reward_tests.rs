// ============================================================================
// REWARD CREDITING TESTS - referral, ad postback, task claims
// ============================================================================

mod common;

use std::time::Duration;

use common::*;
use pocket_ledger::{LedgerError, RewardService};

fn service(store: &pocket_ledger::LedgerStore, notifier: std::sync::Arc<RecordingNotifier>) -> RewardService {
    RewardService::new(store.clone(), notifier, test_config())
}

async fn settle_spawned() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

// ============================================================================
// REFERRAL
// ============================================================================

#[tokio::test]
async fn referral_double_delivery_credits_once() {
    let (_dir, store) = open_store();
    store.ensure_account("ref", "Referrer", None, None).unwrap();

    let notifier = RecordingNotifier::new();
    let rewards = service(&store, notifier.clone());

    // At-least-once delivery: the same join event arrives twice
    rewards.credit_referral("ref", "u2", "Bob", None);
    rewards.credit_referral("ref", "u2", "Bob", None);

    let acc = store.get_account("ref").unwrap();
    assert_eq!(acc.diamonds, 2.0);
    assert_eq!(acc.referrals.len(), 1);

    // Only the first delivery notifies the referrer
    settle_spawned().await;
    assert_eq!(notifier.user_messages.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn distinct_referrals_each_credit() {
    let (_dir, store) = open_store();
    store.ensure_account("ref", "Referrer", None, None).unwrap();

    let rewards = service(&store, RecordingNotifier::new());
    rewards.credit_referral("ref", "u2", "Bob", None);
    rewards.credit_referral("ref", "u3", "Carol", None);

    let acc = store.get_account("ref").unwrap();
    assert_eq!(acc.diamonds, 4.0);
    assert_eq!(acc.referrals.len(), 2);
}

#[tokio::test]
async fn self_referral_and_unknown_referrer_are_absorbed() {
    let (_dir, store) = open_store();
    store.ensure_account("u1", "Alice", None, None).unwrap();

    let rewards = service(&store, RecordingNotifier::new());
    rewards.credit_referral("u1", "u1", "Alice", None);
    rewards.credit_referral("ghost", "u1", "Alice", None);

    assert_eq!(store.get_account("u1").unwrap().diamonds, 0.0);
}

// ============================================================================
// AD POSTBACKS
// ============================================================================

#[tokio::test]
async fn ad_postback_replay_credits_once() {
    let (_dir, store) = open_store();
    store.ensure_account("u1", "Alice", None, None).unwrap();

    let rewards = service(&store, RecordingNotifier::new());

    rewards
        .credit_ad_reward("u1", "postback-secret", Some("imp-77"))
        .unwrap();
    assert!(matches!(
        rewards.credit_ad_reward("u1", "postback-secret", Some("imp-77")),
        Err(LedgerError::AlreadyProcessed(_))
    ));

    assert_eq!(store.get_account("u1").unwrap().diamonds, 0.5);
}

#[tokio::test]
async fn distinct_impressions_each_credit() {
    let (_dir, store) = open_store();
    store.ensure_account("u1", "Alice", None, None).unwrap();

    let rewards = service(&store, RecordingNotifier::new());
    rewards
        .credit_ad_reward("u1", "postback-secret", Some("imp-1"))
        .unwrap();
    rewards
        .credit_ad_reward("u1", "postback-secret", Some("imp-2"))
        .unwrap();

    assert_eq!(store.get_account("u1").unwrap().diamonds, 1.0);
}

#[tokio::test]
async fn ad_postback_without_impression_id_collapses_in_window() {
    let (_dir, store) = open_store();
    store.ensure_account("u1", "Alice", None, None).unwrap();

    let rewards = service(&store, RecordingNotifier::new());

    // Same URL replayed inside one window dedups on the hashed key
    rewards
        .credit_ad_reward("u1", "postback-secret", None)
        .unwrap();
    assert!(matches!(
        rewards.credit_ad_reward("u1", "postback-secret", None),
        Err(LedgerError::AlreadyProcessed(_))
    ));

    assert_eq!(store.get_account("u1").unwrap().diamonds, 0.5);
}

#[tokio::test]
async fn ad_postback_bad_token_is_unauthorized() {
    let (_dir, store) = open_store();
    store.ensure_account("u1", "Alice", None, None).unwrap();

    let rewards = service(&store, RecordingNotifier::new());
    assert!(matches!(
        rewards.credit_ad_reward("u1", "wrong-secret", Some("imp-1")),
        Err(LedgerError::Unauthorized)
    ));
    assert_eq!(store.get_account("u1").unwrap().diamonds, 0.0);
}

#[tokio::test]
async fn ad_postback_unknown_user_is_not_found() {
    let (_dir, store) = open_store();
    let rewards = service(&store, RecordingNotifier::new());
    assert!(matches!(
        rewards.credit_ad_reward("ghost", "postback-secret", Some("imp-1")),
        Err(LedgerError::NotFound(_))
    ));
}

// ============================================================================
// TASK CLAIMS
// ============================================================================

#[tokio::test]
async fn task_claim_once_per_task_id() {
    let (_dir, store) = open_store();
    store.ensure_account("u1", "Alice", None, None).unwrap();

    let rewards = service(&store, RecordingNotifier::new());
    rewards.claim_task_reward("u1", "quiz-3", 25.0).unwrap();
    assert!(matches!(
        rewards.claim_task_reward("u1", "quiz-3", 25.0),
        Err(LedgerError::AlreadyProcessed(_))
    ));

    assert_eq!(store.get_account("u1").unwrap().balance_fiat, 25.0);
}

#[tokio::test]
async fn task_claim_validates_amount_ceiling() {
    let (_dir, store) = open_store();
    store.ensure_account("u1", "Alice", None, None).unwrap();

    let rewards = service(&store, RecordingNotifier::new());
    for amount in [0.0, -5.0, 101.0, f64::NAN] {
        assert!(matches!(
            rewards.claim_task_reward("u1", "quiz-3", amount),
            Err(LedgerError::Validation(_))
        ));
    }
    assert_eq!(store.get_account("u1").unwrap().balance_fiat, 0.0);
}
