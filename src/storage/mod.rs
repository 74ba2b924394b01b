// ============================================================================
// POCKET LEDGER - STORAGE LAYER & TRANSACTION EXECUTOR
// ============================================================================
//
// Simple, fast, production-ready storage using:
// - ReDB: ACID-compliant embedded database (like SQLite, but key-value)
// - DashMap: Lock-free concurrent HashMap for hot reads
//
// This module is the ONLY writer of account balances, diamonds and
// withdrawal records. Every mutation is a single ReDB write transaction:
// the read of current state and the write of new state are atomic with
// respect to any other concurrent operation on the same key, because ReDB
// serializes writers (single-writer MVCC). Two withdrawals can never both
// pass a balance check against funds only one of them reserved.
//
// CONCURRENCY MODEL:
// - Reads: lock-free via DashMap cache, ReDB fallback on miss
// - Writes: ReDB write transactions, cache updated AFTER commit
// - Commit conflicts: retried locally up to MAX_COMMIT_RETRIES; callers
//   must never route an external side effect through the retry loop
//
// ============================================================================

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use redb::{Database, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{LedgerError, LedgerResult};
use crate::model::{
    Account, Currency, Destination, ReferralRecord, WithdrawalRequest, WithdrawalStatus,
};

// ============================================================================
// REDB TABLE DEFINITIONS
// ============================================================================

/// Accounts: user_id (String) -> Account (JSON bytes)
const ACCOUNTS: TableDefinition<&str, &[u8]> = TableDefinition::new("accounts");

/// Withdrawal requests: request id (String) -> WithdrawalRequest (JSON bytes)
const WITHDRAWALS: TableDefinition<&str, &[u8]> = TableDefinition::new("withdrawals");

/// Ad-impression dedup keys: key (String) -> first-seen unix timestamp
const IMPRESSIONS: TableDefinition<&str, u64> = TableDefinition::new("impressions");

/// Bounded local retry budget for conflicting commits
const MAX_COMMIT_RETRIES: usize = 3;

// ============================================================================
// CONDITIONAL MUTATIONS
// ============================================================================

/// Boolean predicate over current account fields, checked inside the same
/// write transaction that applies the mutations.
#[derive(Debug, Clone, Copy)]
pub enum Precondition {
    FiatAtLeast(f64),
    CryptoAtLeast(f64),
    DiamondsAtLeast(f64),
}

/// Delta operation over account fields. All mutations in one
/// `apply_conditional` call commit atomically or not at all.
#[derive(Debug, Clone, Copy)]
pub enum Mutation {
    AdjustFiat(f64),
    AdjustCrypto(f64),
    AdjustDiamonds(f64),
}

// ============================================================================
// LEDGER STORE
// ============================================================================

/// Durable account + withdrawal store with lock-free reads.
///
/// # Thread Safety
/// - `Clone` is cheap (Arc handles)
/// - `get_account()` is lock-free on cache hits
/// - all write operations go through ReDB's serialized write transactions
#[derive(Clone)]
pub struct LedgerStore {
    /// ReDB database handle (Arc allows sharing across threads)
    db: Arc<Database>,

    /// In-memory account cache (DashMap = lock-free reads)
    cache: Arc<DashMap<String, Account>>,
}

impl LedgerStore {
    /// Create or open the ledger database at the given directory
    pub fn open(path: &str) -> LedgerResult<Self> {
        info!(path = %path, "Opening ledger database");

        std::fs::create_dir_all(path).map_err(store_err)?;
        let db = Database::create(format!("{}/ledger.redb", path)).map_err(store_err)?;

        // Initialize tables
        let write_txn = db.begin_write().map_err(store_err)?;
        {
            let _ = write_txn.open_table(ACCOUNTS).map_err(store_err)?;
            let _ = write_txn.open_table(WITHDRAWALS).map_err(store_err)?;
            let _ = write_txn.open_table(IMPRESSIONS).map_err(store_err)?;
        }
        write_txn.commit().map_err(store_err)?;

        // Warm the account cache
        let cache = Arc::new(DashMap::new());
        {
            let read_txn = db.begin_read().map_err(store_err)?;
            let table = read_txn.open_table(ACCOUNTS).map_err(store_err)?;
            let mut iter = table.iter().map_err(store_err)?;
            while let Some(entry) = iter.next() {
                let (key, value) = entry.map_err(store_err)?;
                let account: Account = decode(value.value())?;
                cache.insert(key.value().to_string(), account);
            }
        }

        info!(accounts = cache.len(), "Ledger database loaded");

        Ok(Self {
            db: Arc::new(db),
            cache,
        })
    }

    // ========================================================================
    // READ OPERATIONS (Lock-Free on cache hit)
    // ========================================================================

    /// Get an account by user id
    pub fn get_account(&self, user_id: &str) -> Option<Account> {
        if let Some(account) = self.cache.get(user_id) {
            return Some(account.clone());
        }

        // Slow path: disk (rare, only on cache miss)
        let read_txn = self.db.begin_read().ok()?;
        let table = read_txn.open_table(ACCOUNTS).ok()?;
        let account: Account = table
            .get(user_id)
            .ok()
            .flatten()
            .and_then(|v| decode(v.value()).ok())?;
        self.cache.insert(user_id.to_string(), account.clone());
        Some(account)
    }

    /// Get a withdrawal request by id
    pub fn get_withdrawal(&self, id: &str) -> LedgerResult<WithdrawalRequest> {
        let read_txn = self.db.begin_read().map_err(store_err)?;
        let table = read_txn.open_table(WITHDRAWALS).map_err(store_err)?;
        match table.get(id).map_err(store_err)? {
            Some(value) => decode(value.value()),
            None => Err(LedgerError::NotFound(format!("withdrawal {}", id))),
        }
    }

    /// All non-terminal withdrawal requests, oldest first
    pub fn pending_withdrawals(&self) -> LedgerResult<Vec<WithdrawalRequest>> {
        let read_txn = self.db.begin_read().map_err(store_err)?;
        let table = read_txn.open_table(WITHDRAWALS).map_err(store_err)?;

        let mut pending = Vec::new();
        let mut iter = table.iter().map_err(store_err)?;
        while let Some(entry) = iter.next() {
            let (_, value) = entry.map_err(store_err)?;
            let request: WithdrawalRequest = decode(value.value())?;
            if request.status == WithdrawalStatus::Pending {
                pending.push(request);
            }
        }
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(pending)
    }

    /// Store statistics for health reporting
    pub fn stats(&self) -> serde_json::Value {
        let pending = self.pending_withdrawals().map(|p| p.len()).unwrap_or(0);
        serde_json::json!({
            "accounts": self.cache.len(),
            "pending_withdrawals": pending,
        })
    }

    // ========================================================================
    // ACCOUNT LIFECYCLE
    // ========================================================================

    /// Idempotent create-or-touch. A second call for the same user id
    /// updates mutable profile fields only: balances are never reset and
    /// `referred_by` is immutable after creation.
    ///
    /// Returns the account and whether it was newly created.
    pub fn ensure_account(
        &self,
        user_id: &str,
        name: &str,
        username: Option<String>,
        referred_by: Option<String>,
    ) -> LedgerResult<(Account, bool)> {
        if user_id.is_empty() {
            return Err(LedgerError::Validation("userId is required".to_string()));
        }

        self.with_retries(|| {
            let write_txn = self.db.begin_write().map_err(store_err)?;
            let (account, created) = {
                let mut table = write_txn.open_table(ACCOUNTS).map_err(store_err)?;

                let existing: Option<Account> = read_record(&table, user_id)?;
                let (account, created) = match existing {
                    Some(mut account) => {
                        account.name = name.to_string();
                        account.username = username.clone();
                        account.last_active = chrono::Utc::now().to_rfc3339();
                        (account, false)
                    }
                    None => {
                        // Self-referral is dropped at creation
                        let referrer = referred_by
                            .clone()
                            .filter(|r| !r.is_empty() && r != user_id);
                        (Account::new(user_id, name, username.clone(), referrer), true)
                    }
                };

                write_record(&mut table, user_id, &account)?;
                (account, created)
            };
            write_txn.commit().map_err(commit_err)?;

            self.cache.insert(user_id.to_string(), account.clone());
            if created {
                info!(user_id = %user_id, "Account created");
            }
            Ok((account, created))
        })
    }

    // ========================================================================
    // CONDITIONAL MUTATION (the generic executor contract)
    // ========================================================================

    /// Apply a set of delta mutations to one account, guarded by
    /// preconditions over its current state. Check and write are one
    /// atomic unit; on precondition failure nothing is mutated. Any delta
    /// that would drive a balance or the diamond count negative is
    /// rejected the same way.
    pub fn apply_conditional(
        &self,
        user_id: &str,
        preconditions: &[Precondition],
        mutations: &[Mutation],
    ) -> LedgerResult<Account> {
        self.with_retries(|| {
            let write_txn = self.db.begin_write().map_err(store_err)?;
            let account = {
                let mut table = write_txn.open_table(ACCOUNTS).map_err(store_err)?;

                let mut account: Account = read_record(&table, user_id)?
                    .ok_or_else(|| LedgerError::NotFound(format!("account {}", user_id)))?;

                check_preconditions(&account, preconditions)?;

                for mutation in mutations {
                    match *mutation {
                        Mutation::AdjustFiat(delta) => account.balance_fiat += delta,
                        Mutation::AdjustCrypto(delta) => account.balance_crypto += delta,
                        Mutation::AdjustDiamonds(delta) => account.diamonds += delta,
                    }
                }

                check_invariants(&account)?;
                write_record(&mut table, user_id, &account)?;
                account
            };
            write_txn.commit().map_err(commit_err)?;

            self.cache.insert(user_id.to_string(), account.clone());
            Ok(account)
        })
    }

    // ========================================================================
    // WITHDRAWAL RESERVATION & SETTLEMENT
    // ========================================================================

    /// Reserve funds for a withdrawal: verifies balance and diamond fee,
    /// deducts both, and inserts the Pending request - one multi-record
    /// atomic unit. Nothing is deducted if any check fails.
    pub fn reserve_withdrawal(
        &self,
        user_id: &str,
        amount: f64,
        currency: Currency,
        destination: Destination,
        diamond_fee: f64,
    ) -> LedgerResult<WithdrawalRequest> {
        self.with_retries(|| {
            let request =
                WithdrawalRequest::new(user_id, amount, currency, destination.clone(), diamond_fee);

            let write_txn = self.db.begin_write().map_err(store_err)?;
            let account = {
                let mut accounts = write_txn.open_table(ACCOUNTS).map_err(store_err)?;
                let mut withdrawals = write_txn.open_table(WITHDRAWALS).map_err(store_err)?;

                let mut account: Account = read_record(&accounts, user_id)?
                    .ok_or_else(|| LedgerError::NotFound(format!("account {}", user_id)))?;

                if account.balance(currency) < amount {
                    return Err(LedgerError::PreconditionFailed(format!(
                        "insufficient {} balance: have {:.4}, need {:.4}",
                        currency,
                        account.balance(currency),
                        amount
                    )));
                }
                if account.diamonds < diamond_fee {
                    return Err(LedgerError::PreconditionFailed(format!(
                        "insufficient diamonds for fee: have {:.2}, need {:.2}",
                        account.diamonds, diamond_fee
                    )));
                }

                match currency {
                    Currency::Fiat => account.balance_fiat -= amount,
                    Currency::Crypto => account.balance_crypto -= amount,
                }
                account.diamonds -= diamond_fee;

                write_record(&mut accounts, user_id, &account)?;
                write_record(&mut withdrawals, request.id.as_str(), &request)?;
                account
            };
            write_txn.commit().map_err(commit_err)?;

            self.cache.insert(user_id.to_string(), account);
            info!(
                request_id = %request.id,
                user_id = %user_id,
                amount = amount,
                currency = %currency,
                fee = diamond_fee,
                "Withdrawal reserved"
            );
            Ok(request)
        })
    }

    /// `Pending -> Paid`. Funds were already reserved at request time, so
    /// no balance mutation happens here. Terminal requests yield
    /// `AlreadyProcessed` and no side effect.
    pub fn mark_withdrawal_paid(
        &self,
        id: &str,
        gateway_tx: Option<String>,
    ) -> LedgerResult<WithdrawalRequest> {
        self.with_retries(|| {
            let write_txn = self.db.begin_write().map_err(store_err)?;
            let request = {
                let mut withdrawals = write_txn.open_table(WITHDRAWALS).map_err(store_err)?;

                let mut request: WithdrawalRequest = read_record(&withdrawals, id)?
                    .ok_or_else(|| LedgerError::NotFound(format!("withdrawal {}", id)))?;
                request.ensure_pending()?;

                request.status = WithdrawalStatus::Paid;
                request.awaiting_reconciliation = false;
                request.gateway_tx = gateway_tx.clone();
                request.settled_at = Some(chrono::Utc::now().to_rfc3339());

                write_record(&mut withdrawals, id, &request)?;
                request
            };
            write_txn.commit().map_err(commit_err)?;

            info!(request_id = %id, "Withdrawal marked paid");
            Ok(request)
        })
    }

    /// `Pending -> Rejected` plus refund of the reserved amount and diamond
    /// fee, in the same atomic unit that flips the status. Refund and
    /// state change are never two separate writes.
    pub fn reject_withdrawal(&self, id: &str) -> LedgerResult<WithdrawalRequest> {
        self.with_retries(|| {
            let write_txn = self.db.begin_write().map_err(store_err)?;
            let (request, account) = {
                let mut accounts = write_txn.open_table(ACCOUNTS).map_err(store_err)?;
                let mut withdrawals = write_txn.open_table(WITHDRAWALS).map_err(store_err)?;

                let mut request: WithdrawalRequest = read_record(&withdrawals, id)?
                    .ok_or_else(|| LedgerError::NotFound(format!("withdrawal {}", id)))?;
                request.ensure_pending()?;

                let mut account: Account = read_record(&accounts, request.user_id.as_str())?
                    .ok_or_else(|| {
                        LedgerError::Storage(format!(
                            "account {} missing for withdrawal {}",
                            request.user_id, id
                        ))
                    })?;

                match request.currency {
                    Currency::Fiat => account.balance_fiat += request.amount,
                    Currency::Crypto => account.balance_crypto += request.amount,
                }
                account.diamonds += request.diamond_fee;

                request.status = WithdrawalStatus::Rejected;
                request.awaiting_reconciliation = false;
                request.settled_at = Some(chrono::Utc::now().to_rfc3339());

                write_record(&mut accounts, request.user_id.as_str(), &account)?;
                write_record(&mut withdrawals, id, &request)?;
                (request, account)
            };
            write_txn.commit().map_err(commit_err)?;

            self.cache.insert(request.user_id.clone(), account);
            info!(
                request_id = %id,
                user_id = %request.user_id,
                refunded = request.amount,
                fee_refunded = request.diamond_fee,
                "Withdrawal rejected and refunded"
            );
            Ok(request)
        })
    }

    /// Flag a Pending request whose external transfer outcome is unknown.
    /// Status stays Pending: the transfer may still complete, so funds are
    /// NOT refunded here. An operator settles it later.
    pub fn mark_awaiting_reconciliation(&self, id: &str) -> LedgerResult<WithdrawalRequest> {
        self.with_retries(|| {
            let write_txn = self.db.begin_write().map_err(store_err)?;
            let request = {
                let mut withdrawals = write_txn.open_table(WITHDRAWALS).map_err(store_err)?;

                let mut request: WithdrawalRequest = read_record(&withdrawals, id)?
                    .ok_or_else(|| LedgerError::NotFound(format!("withdrawal {}", id)))?;
                request.ensure_pending()?;

                request.awaiting_reconciliation = true;
                write_record(&mut withdrawals, id, &request)?;
                request
            };
            write_txn.commit().map_err(commit_err)?;

            warn!(request_id = %id, "Withdrawal flagged for manual reconciliation");
            Ok(request)
        })
    }

    // ========================================================================
    // REWARD CREDITING
    // ========================================================================

    /// Credit a referrer for a confirmed join. Idempotent per
    /// (referrer, referred) pair: the referral list is the dedup set,
    /// checked and appended in the same transaction as the diamond credit.
    ///
    /// Returns true when diamonds were credited, false on duplicate
    /// delivery or missing referrer (logged, not fatal).
    pub fn credit_referral(
        &self,
        referrer_id: &str,
        referred_user_id: &str,
        display_name: &str,
        photo_ref: Option<String>,
        reward: f64,
    ) -> LedgerResult<bool> {
        self.with_retries(|| {
            let write_txn = self.db.begin_write().map_err(store_err)?;
            let account = {
                let mut accounts = write_txn.open_table(ACCOUNTS).map_err(store_err)?;

                let existing: Option<Account> = read_record(&accounts, referrer_id)?;
                let Some(mut account) = existing else {
                    warn!(referrer_id = %referrer_id, "Referral credit skipped: referrer unknown");
                    return Ok(false);
                };

                if account.has_referral(referred_user_id) {
                    return Ok(false);
                }

                account.referrals.push(ReferralRecord {
                    referred_user_id: referred_user_id.to_string(),
                    display_name: display_name.to_string(),
                    photo_ref: photo_ref.clone(),
                    joined_at: chrono::Utc::now().to_rfc3339(),
                });
                account.diamonds += reward;

                write_record(&mut accounts, referrer_id, &account)?;
                account
            };
            write_txn.commit().map_err(commit_err)?;

            self.cache.insert(referrer_id.to_string(), account);
            info!(
                referrer_id = %referrer_id,
                referred_user_id = %referred_user_id,
                reward = reward,
                "Referral credited"
            );
            Ok(true)
        })
    }

    /// Credit diamonds for a verified ad view, exactly once per dedup key.
    /// The key is checked and recorded in the same transaction as the
    /// credit, so a replayed postback cannot double-credit.
    pub fn credit_ad_reward(
        &self,
        user_id: &str,
        dedup_key: &str,
        reward: f64,
    ) -> LedgerResult<Account> {
        self.with_retries(|| {
            let write_txn = self.db.begin_write().map_err(store_err)?;
            let account = {
                let mut accounts = write_txn.open_table(ACCOUNTS).map_err(store_err)?;
                let mut impressions = write_txn.open_table(IMPRESSIONS).map_err(store_err)?;

                if impressions.get(dedup_key).map_err(store_err)?.is_some() {
                    return Err(LedgerError::AlreadyProcessed(
                        "ad impression already credited".to_string(),
                    ));
                }

                let mut account: Account = read_record(&accounts, user_id)?
                    .ok_or_else(|| LedgerError::NotFound(format!("account {}", user_id)))?;

                account.diamonds += reward;

                impressions
                    .insert(dedup_key, unix_now())
                    .map_err(store_err)?;
                write_record(&mut accounts, user_id, &account)?;
                account
            };
            write_txn.commit().map_err(commit_err)?;

            self.cache.insert(user_id.to_string(), account.clone());
            info!(user_id = %user_id, reward = reward, "Ad reward credited");
            Ok(account)
        })
    }

    /// Credit a completed-task reward to the fiat balance, exactly once per
    /// task id.
    pub fn claim_task_reward(
        &self,
        user_id: &str,
        task_id: &str,
        amount: f64,
    ) -> LedgerResult<Account> {
        self.with_retries(|| {
            let write_txn = self.db.begin_write().map_err(store_err)?;
            let account = {
                let mut accounts = write_txn.open_table(ACCOUNTS).map_err(store_err)?;

                let mut account: Account = read_record(&accounts, user_id)?
                    .ok_or_else(|| LedgerError::NotFound(format!("account {}", user_id)))?;

                if account.completed_tasks.iter().any(|t| t == task_id) {
                    return Err(LedgerError::AlreadyProcessed(format!(
                        "task {} already claimed",
                        task_id
                    )));
                }

                account.completed_tasks.push(task_id.to_string());
                account.balance_fiat += amount;

                write_record(&mut accounts, user_id, &account)?;
                account
            };
            write_txn.commit().map_err(commit_err)?;

            self.cache.insert(user_id.to_string(), account.clone());
            info!(user_id = %user_id, task_id = %task_id, amount = amount, "Task reward claimed");
            Ok(account)
        })
    }

    // ========================================================================
    // RETRY LOOP
    // ========================================================================

    /// Retry the read-check-write cycle on conflicting commits, up to a
    /// bounded attempt count. The closure must contain NO external side
    /// effects: a retried operation may run more than once.
    fn with_retries<T>(&self, mut op: impl FnMut() -> LedgerResult<T>) -> LedgerResult<T> {
        let mut attempt = 0;
        loop {
            match op() {
                Err(LedgerError::StoreConflict) if attempt + 1 < MAX_COMMIT_RETRIES => {
                    attempt += 1;
                    warn!(attempt = attempt, "Store commit conflict, retrying");
                }
                other => return other,
            }
        }
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn check_preconditions(account: &Account, preconditions: &[Precondition]) -> LedgerResult<()> {
    for pre in preconditions {
        let (ok, what) = match *pre {
            Precondition::FiatAtLeast(min) => (account.balance_fiat >= min, "fiat balance"),
            Precondition::CryptoAtLeast(min) => (account.balance_crypto >= min, "crypto balance"),
            Precondition::DiamondsAtLeast(min) => (account.diamonds >= min, "diamonds"),
        };
        if !ok {
            return Err(LedgerError::PreconditionFailed(format!(
                "insufficient {}",
                what
            )));
        }
    }
    Ok(())
}

/// No balance or diamond field may go negative at any observable time
fn check_invariants(account: &Account) -> LedgerResult<()> {
    if account.balance_fiat < 0.0 || account.balance_crypto < 0.0 || account.diamonds < 0.0 {
        return Err(LedgerError::PreconditionFailed(
            "mutation would produce a negative balance".to_string(),
        ));
    }
    Ok(())
}

fn read_record<T, V>(table: &T, key: &str) -> LedgerResult<Option<V>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
    V: DeserializeOwned,
{
    match table.get(key).map_err(store_err)? {
        Some(value) => Ok(Some(decode(value.value())?)),
        None => Ok(None),
    }
}

fn write_record<V: Serialize>(
    table: &mut redb::Table<'_, &'static str, &'static [u8]>,
    key: &str,
    value: &V,
) -> LedgerResult<()> {
    let bytes = serde_json::to_vec(value).map_err(store_err)?;
    table.insert(key, bytes.as_slice()).map_err(store_err)?;
    Ok(())
}

fn decode<V: DeserializeOwned>(bytes: &[u8]) -> LedgerResult<V> {
    serde_json::from_slice(bytes).map_err(store_err)
}

fn store_err<E: std::fmt::Display>(e: E) -> LedgerError {
    LedgerError::Storage(e.to_string())
}

/// Commit failures are transient (conflicting writers) and retryable
fn commit_err<E: std::fmt::Display>(_e: E) -> LedgerError {
    LedgerError::StoreConflict
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ============================================================================
// TESTS
// ============================================================================
