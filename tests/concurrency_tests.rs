// ============================================================================
// CONCURRENCY TESTS - serialized writers, no over-reservation
// ============================================================================

mod common;

use common::*;
use pocket_ledger::{LedgerStore, Mutation};

#[test]
fn concurrent_reservations_never_over_reserve() {
    let (_dir, store) = open_store();
    funded_account(&store, "u1", 1.0, 0.0, 10.0);

    // 8 threads each try to reserve 0.25 crypto; only 4 can succeed
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store: LedgerStore = store.clone();
            std::thread::spawn(move || {
                store
                    .reserve_withdrawal("u1", 0.25, crypto(), ton_destination(), 0.0)
                    .is_ok()
            })
        })
        .collect();

    let successes = handles
        .into_iter()
        .map(|h| h.join())
        .filter(|r| matches!(r, Ok(true)))
        .count();

    assert_eq!(successes, 4);
    let acc = store.get_account("u1").unwrap();
    assert_eq!(acc.balance_crypto, 0.0);
    assert_eq!(store.pending_withdrawals().unwrap().len(), 4);
}

#[test]
fn concurrent_credits_all_land() {
    let (_dir, store) = open_store();
    store.ensure_account("u1", "Alice", None, None).unwrap();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let store: LedgerStore = store.clone();
            std::thread::spawn(move || {
                store
                    .apply_conditional("u1", &[], &[Mutation::AdjustDiamonds(0.5)])
                    .unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(store.get_account("u1").unwrap().diamonds, 8.0);
}

#[test]
fn concurrent_referral_double_delivery_credits_once() {
    let (_dir, store) = open_store();
    store.ensure_account("ref", "Referrer", None, None).unwrap();

    // The same join event races against itself
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store: LedgerStore = store.clone();
            std::thread::spawn(move || {
                store
                    .credit_referral("ref", "u2", "Bob", None, 2.0)
                    .unwrap()
            })
        })
        .collect();

    let credited = handles
        .into_iter()
        .map(|h| h.join())
        .filter(|r| matches!(r, Ok(true)))
        .count();

    assert_eq!(credited, 1);
    let acc = store.get_account("ref").unwrap();
    assert_eq!(acc.diamonds, 2.0);
    assert_eq!(acc.referrals.len(), 1);
}
