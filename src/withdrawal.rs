// ============================================================================
// WITHDRAWAL ROUTER - auto-payout vs manual settlement
// ============================================================================
//
// Small crypto withdrawals are paid immediately through the external
// gateway; everything else waits for an operator. The external transfer is
// irreversible and non-idempotent, so the auto path runs a strict
// three-phase protocol:
//
//   phase 1: reserve funds atomically (optimistic hold)
//   phase 2: call the gateway EXACTLY ONCE, outside any retry loop
//   phase 3: commit the outcome atomically
//
// On a confirmed failure the hold is refunded and the request rejected in
// one atomic unit. On an ambiguous outcome (timeout, no confirmation) the
// request stays Pending with a reconciliation flag: the transfer may still
// land, so neither a retry nor a refund is safe.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{LedgerError, LedgerResult};
use crate::gateway::{PaymentGateway, TransferOutcome};
use crate::model::{Currency, Destination, WithdrawalStatus};
use crate::notify::{notify_operator_detached, Notifier};
use crate::storage::LedgerStore;

/// What the caller learns about a settled or parked request
#[derive(Debug, Clone, Serialize)]
pub struct WithdrawalOutcome {
    pub request_id: String,
    pub status: WithdrawalStatus,
}

pub struct WithdrawalRouter {
    store: LedgerStore,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    config: Config,
}

impl WithdrawalRouter {
    pub fn new(
        store: LedgerStore,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        config: Config,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            config,
        }
    }

    /// Route a withdrawal request: validate, reserve, then settle
    /// automatically or park for operator review.
    pub async fn request_withdrawal(
        &self,
        user_id: &str,
        amount: f64,
        currency: Currency,
        destination: Destination,
        diamond_fee: f64,
    ) -> LedgerResult<WithdrawalOutcome> {
        // Validation happens before the store is touched
        if user_id.is_empty() {
            return Err(LedgerError::Validation("userId is required".to_string()));
        }
        if amount <= 0.0 || !amount.is_finite() {
            return Err(LedgerError::Validation(
                "amount must be positive".to_string(),
            ));
        }
        if diamond_fee < 0.0 || !diamond_fee.is_finite() {
            return Err(LedgerError::Validation(
                "diamondFee must not be negative".to_string(),
            ));
        }
        if destination.address.is_empty() || destination.method.is_empty() {
            return Err(LedgerError::Validation(
                "destination method and address are required".to_string(),
            ));
        }

        let auto = currency == Currency::Crypto
            && amount <= self.config.auto_payout_limit
            && self.config.auto_payout_enabled();

        if auto {
            self.auto_payout(user_id, amount, destination, diamond_fee)
                .await
        } else {
            self.manual_review(user_id, amount, currency, destination, diamond_fee)
                .await
        }
    }

    // ========================================================================
    // AUTO PATH
    // ========================================================================

    async fn auto_payout(
        &self,
        user_id: &str,
        amount: f64,
        destination: Destination,
        diamond_fee: f64,
    ) -> LedgerResult<WithdrawalOutcome> {
        // Phase 1: atomic optimistic hold
        let request = self.store.reserve_withdrawal(
            user_id,
            amount,
            Currency::Crypto,
            destination.clone(),
            diamond_fee,
        )?;

        // Phase 2: the one and only transfer attempt. The await runs to
        // completion; the attempt is never cancelled once dispatched.
        let outcome = self
            .gateway
            .transfer(&destination, amount, &request.id)
            .await;

        // Phase 3: commit the outcome
        match outcome {
            TransferOutcome::Success { reference } => {
                let settled = self
                    .store
                    .mark_withdrawal_paid(&request.id, Some(reference))?;
                info!(request_id = %settled.id, amount = amount, "Auto-payout complete");
                Ok(WithdrawalOutcome {
                    request_id: settled.id,
                    status: settled.status,
                })
            }
            TransferOutcome::Failure { reason } => {
                // Confirmed failure: refund + reject in one atomic unit
                let settled = self.store.reject_withdrawal(&request.id)?;
                warn!(request_id = %settled.id, reason = %reason, "Auto-payout failed, hold refunded");
                Ok(WithdrawalOutcome {
                    request_id: settled.id,
                    status: settled.status,
                })
            }
            TransferOutcome::Ambiguous => {
                // Unknown outcome: park for reconciliation. The transfer
                // may still complete, so no refund and no second attempt.
                self.store.mark_awaiting_reconciliation(&request.id)?;
                notify_operator_detached(
                    self.notifier.clone(),
                    format!(
                        "⚠️ *Transfer outcome unknown*\nRequest `{}`: {} crypto to {} ({}).\nVerify on the payment network before settling.",
                        request.id, amount, destination.address, destination.method
                    ),
                    Some(request.clone()),
                );
                Err(LedgerError::AmbiguousExternalResult)
            }
        }
    }

    // ========================================================================
    // MANUAL PATH
    // ========================================================================

    async fn manual_review(
        &self,
        user_id: &str,
        amount: f64,
        currency: Currency,
        destination: Destination,
        diamond_fee: f64,
    ) -> LedgerResult<WithdrawalOutcome> {
        // Reserve funds atomically; no transfer is attempted here
        let request =
            self.store
                .reserve_withdrawal(user_id, amount, currency, destination, diamond_fee)?;

        notify_operator_detached(
            self.notifier.clone(),
            format!(
                "💸 *Withdrawal request*\nUser: `{}`\nAmount: {} {}\nDestination: {} ({})\nFee: {} 💎",
                request.user_id,
                request.amount,
                request.currency,
                request.destination.address,
                request.destination.method,
                request.diamond_fee
            ),
            Some(request.clone()),
        );

        info!(request_id = %request.id, "Withdrawal queued for manual review");
        Ok(WithdrawalOutcome {
            request_id: request.id,
            status: WithdrawalStatus::Pending,
        })
    }
}
