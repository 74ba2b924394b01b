// ============================================================================
// POCKET LEDGER - Reward Ledger & Withdrawal Settlement Engine
// ============================================================================
//
// Backend for a Telegram mini-app economy: diamond rewards for referrals,
// ad views and tasks, plus fiat/crypto withdrawals settled automatically
// through a payment gateway or manually by an operator.
//
// ARCHITECTURE:
// - Framework: Axum 0.7
// - Storage: ReDB (ACID, single-writer MVCC) + DashMap read cache
// - All balance writes funnel through LedgerStore's atomic transactions
// - External transfers are two-phase: reserve, transfer once, commit outcome

pub mod config;
pub mod error;
pub mod gateway;
pub mod model;
pub mod notify;
pub mod rewards;
pub mod routes;
pub mod settlement;
pub mod storage;
pub mod withdrawal;

pub use config::Config;
pub use error::{LedgerError, LedgerResult};
pub use gateway::{HttpPaymentGateway, PaymentGateway, TransferOutcome};
pub use model::{
    Account, Currency, Destination, ReferralRecord, WithdrawalRequest, WithdrawalStatus,
};
pub use notify::{NoopNotifier, Notifier, TelegramNotifier};
pub use rewards::RewardService;
pub use routes::{build_router, AppState};
pub use settlement::AdminSettlement;
pub use storage::{LedgerStore, Mutation, Precondition};
pub use withdrawal::{WithdrawalOutcome, WithdrawalRouter};
