// ============================================================================
// ADMIN SETTLEMENT - operator decisions on pending withdrawals
// ============================================================================
//
// Manual withdrawals (and ambiguous auto-payouts parked for reconciliation)
// are resolved here. Approve confirms the operator paid out-of-band, so no
// balance moves; reject refunds the hold atomically with the status flip.
// Both transitions are one-shot: a second settle attempt on the same
// request surfaces AlreadyProcessed with no side effect.

use std::sync::Arc;

use tracing::info;

use crate::error::LedgerResult;
use crate::model::WithdrawalRequest;
use crate::notify::{notify_user_detached, Notifier};
use crate::storage::LedgerStore;

pub struct AdminSettlement {
    store: LedgerStore,
    notifier: Arc<dyn Notifier>,
}

impl AdminSettlement {
    pub fn new(store: LedgerStore, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// `Pending -> Paid`. Funds were reserved at request time and the
    /// operator has transferred them externally; nothing moves here.
    pub fn approve(&self, request_id: &str) -> LedgerResult<WithdrawalRequest> {
        let request = self.store.mark_withdrawal_paid(request_id, None)?;

        info!(request_id = %request.id, user_id = %request.user_id, "Withdrawal approved");
        notify_user_detached(
            self.notifier.clone(),
            request.user_id.clone(),
            format!(
                "✅ Your withdrawal of {} {} has been paid to {} ({}).",
                request.amount,
                request.currency,
                request.destination.address,
                request.destination.method
            ),
        );
        Ok(request)
    }

    /// `Pending -> Rejected`. Refund of the amount and the diamond fee
    /// happens in the same atomic unit as the status flip.
    pub fn reject(&self, request_id: &str) -> LedgerResult<WithdrawalRequest> {
        let request = self.store.reject_withdrawal(request_id)?;

        info!(request_id = %request.id, user_id = %request.user_id, "Withdrawal rejected");
        notify_user_detached(
            self.notifier.clone(),
            request.user_id.clone(),
            format!(
                "❌ Your withdrawal of {} {} was rejected. The amount and {} 💎 fee have been returned to your balance.",
                request.amount, request.currency, request.diamond_fee
            ),
        );
        Ok(request)
    }
}
