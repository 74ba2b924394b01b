// ============================================================================
// DATA MODEL - Accounts & Withdrawal Requests
// ============================================================================
//
// Two durable record types, both owned exclusively by the LedgerStore for
// writes. Everything else reads them or submits mutation requests through
// the store's atomic operations.

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

// ============================================================================
// ACCOUNT
// ============================================================================

/// Per-user account record.
///
/// Invariant: `balance_fiat >= 0 && balance_crypto >= 0 && diamonds >= 0`
/// at all observable times. Any mutation that would violate this is
/// rejected atomically by the store, never applied-then-corrected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub user_id: String,
    pub name: String,
    pub username: Option<String>,

    /// Fiat-equivalent balance (BDT payout methods)
    pub balance_fiat: f64,
    /// Crypto balance (TON wallet payouts)
    pub balance_crypto: f64,
    /// In-app virtual currency; fractional increments allowed (e.g. +0.5)
    pub diamonds: f64,

    /// Referrer id, set once at creation, immutable thereafter
    pub referred_by: Option<String>,
    /// Append-only referral list; doubles as the per-pair dedup set
    pub referrals: Vec<ReferralRecord>,
    /// Task ids already claimed; dedup set for task rewards
    pub completed_tasks: Vec<String>,

    pub created_at: String,
    pub last_active: String,
}

impl Account {
    pub fn new(
        user_id: &str,
        name: &str,
        username: Option<String>,
        referred_by: Option<String>,
    ) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            user_id: user_id.to_string(),
            name: name.to_string(),
            username,
            balance_fiat: 0.0,
            balance_crypto: 0.0,
            diamonds: 0.0,
            referred_by,
            referrals: Vec::new(),
            completed_tasks: Vec::new(),
            created_at: now.clone(),
            last_active: now,
        }
    }

    /// Balance field for the given currency
    pub fn balance(&self, currency: Currency) -> f64 {
        match currency {
            Currency::Fiat => self.balance_fiat,
            Currency::Crypto => self.balance_crypto,
        }
    }

    pub fn has_referral(&self, referred_user_id: &str) -> bool {
        self.referrals
            .iter()
            .any(|r| r.referred_user_id == referred_user_id)
    }
}

/// One entry in an account's referral list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralRecord {
    pub referred_user_id: String,
    pub display_name: String,
    /// Profile photo reference, when the upstream event carries one
    #[serde(default)]
    pub photo_ref: Option<String>,
    pub joined_at: String,
}

// ============================================================================
// WITHDRAWAL REQUEST
// ============================================================================

/// Balance denomination. Fiat and crypto are never commingled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    Fiat,
    Crypto,
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Currency::Fiat => write!(f, "fiat"),
            Currency::Crypto => write!(f, "crypto"),
        }
    }
}

/// Payout destination: wallet address or payout method + account number
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Destination {
    /// e.g. "ton", "bkash", "nagad"
    pub method: String,
    /// Wallet address or account number
    pub address: String,
}

/// Withdrawal request state machine:
/// `Pending -> Paid` (terminal) or `Pending -> Rejected` (terminal).
/// No transitions out of a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Paid,
    Rejected,
}

impl WithdrawalStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WithdrawalStatus::Paid | WithdrawalStatus::Rejected)
    }
}

impl std::fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WithdrawalStatus::Pending => write!(f, "pending"),
            WithdrawalStatus::Paid => write!(f, "paid"),
            WithdrawalStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// One withdrawal attempt. Created with balance + diamond fee already
/// reserved; settled to a terminal state exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: String,
    pub user_id: String,
    pub amount: f64,
    pub currency: Currency,
    pub destination: Destination,
    /// Diamonds charged for processing, reserved together with the amount
    pub diamond_fee: f64,
    pub status: WithdrawalStatus,
    /// True when an external transfer was dispatched but its outcome is
    /// unknown. The request stays Pending and must be settled by an
    /// operator; it is never auto-refunded since the transfer may still
    /// complete.
    pub awaiting_reconciliation: bool,
    /// Gateway reference for a confirmed transfer
    pub gateway_tx: Option<String>,
    pub created_at: String,
    pub settled_at: Option<String>,
}

impl WithdrawalRequest {
    pub fn new(
        user_id: &str,
        amount: f64,
        currency: Currency,
        destination: Destination,
        diamond_fee: f64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            amount,
            currency,
            destination,
            diamond_fee,
            status: WithdrawalStatus::Pending,
            awaiting_reconciliation: false,
            gateway_tx: None,
            created_at: chrono::Utc::now().to_rfc3339(),
            settled_at: None,
        }
    }

    /// Guard for settle operations: typed error if already terminal
    pub fn ensure_pending(&self) -> Result<(), LedgerError> {
        if self.status.is_terminal() {
            return Err(LedgerError::AlreadyProcessed(format!(
                "withdrawal {} is already {}",
                self.id, self.status
            )));
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
