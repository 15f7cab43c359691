use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use indexmap::IndexMap;
use parking_lot::Mutex;
use routine_interfaces::{AccountOutcome, AccountPoolHandle, InterfaceError, PooledAccountRef};
use tokio::sync::Notify;

use crate::account::{Account, AccountResult, AccountStatus, SortMethod};
use crate::error::AccountsError;

/// Tunable pool behavior, fixed for the pool's lifetime.
#[derive(Clone)]
pub struct PoolConfig {
    /// Accounts below this `packs_opened` floor are held back from
    /// `GetNext` until they clear warm-up, e.g. seeded by another process.
    pub min_packs: u32,
    /// How `GetNext` selects among the available set.
    pub sort_method: SortMethod,
    /// Whether a failed account re-enters the available set instead of
    /// moving to the terminal `Failed` state.
    pub retry_failed: bool,
    /// The failure count at which a retry-eligible account is instead
    /// moved to `Failed` for good.
    pub max_failures: u32,
    /// If `false`, `GetNext` against an empty eligible set returns
    /// `NoneAvailable` immediately instead of blocking.
    pub wait_for_accounts: bool,
    /// Caps how long a blocking `GetNext` waits before giving up with
    /// `NoneAvailable`. `None` waits indefinitely (bounded only by
    /// `close()`).
    pub max_wait_time: Option<Duration>,
    /// Accounts held in reserve and excluded from `GetNext` regardless of
    /// eligibility, so a pool never checks out its last few accounts.
    pub buffer_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_packs: 0,
            sort_method: SortMethod::default(),
            retry_failed: false,
            max_failures: 3,
            wait_for_accounts: true,
            max_wait_time: None,
            buffer_size: 0,
        }
    }
}

struct Inner {
    available: Vec<Account>,
    in_use: IndexMap<String, Account>,
    completed: IndexMap<String, Account>,
    failed: IndexMap<String, Account>,
    results: Vec<(String, AccountResult)>,
    closed: bool,
}

/// A priority-ordered, blocking pool of accounts shared across bots.
///
/// The available set is a plain `Vec` scanned under a single
/// `parking_lot::Mutex` rather than a `std::collections::BinaryHeap`: a
/// heap's `Ord` must be self-contained, which doesn't admit
/// [`SortMethod::Custom`]'s dynamic comparator. A linear scan costs O(n)
/// per `GetNext` instead of a heap's O(log n); acceptable at pool sizes
/// this runtime manages (tens to low hundreds of accounts).
///
/// Waiters block on a `tokio::sync::Notify` rather than holding the mutex,
/// so a slow `GetNext` caller never blocks `Return`/`MarkUsed` callers.
pub struct AccountPool {
    inner: Mutex<Inner>,
    notify: Notify,
    config: PoolConfig,
}

impl AccountPool {
    /// Seeds the pool with an initial account set.
    #[must_use]
    pub fn new(accounts: Vec<Account>, config: PoolConfig) -> Arc<Self> {
        let available = accounts
            .into_iter()
            .map(|mut account| {
                account.status = AccountStatus::Available;
                account
            })
            .collect();
        Arc::new(Self {
            inner: Mutex::new(Inner {
                available,
                in_use: IndexMap::new(),
                completed: IndexMap::new(),
                failed: IndexMap::new(),
                results: Vec::new(),
                closed: false,
            }),
            notify: Notify::new(),
            config,
        })
    }

    /// Adds an account to the available set after construction, waking any
    /// blocked `GetNext` caller.
    pub fn seed(&self, account: Account) {
        let mut account = account;
        account.status = AccountStatus::Available;
        self.inner.lock().available.push(account);
        self.notify.notify_one();
    }

    /// Looks up an account by id, regardless of which state it's in.
    #[must_use]
    pub fn get_by_id(&self, id: &str) -> Option<Account> {
        let inner = self.inner.lock();
        inner
            .available
            .iter()
            .find(|a| a.id == id)
            .or_else(|| inner.in_use.get(id))
            .or_else(|| inner.completed.get(id))
            .or_else(|| inner.failed.get(id))
            .cloned()
    }

    /// A snapshot of how many accounts sit in each state.
    #[must_use]
    pub fn get_stats(&self) -> PoolStats {
        let inner = self.inner.lock();
        PoolStats {
            available: inner.available.len(),
            in_use: inner.in_use.len(),
            completed: inner.completed.len(),
            failed: inner.failed.len(),
            results_recorded: inner.results.len(),
        }
    }

    /// Idempotently closes the pool, waking every blocked `GetNext` caller
    /// so they observe `AccountsError::Closed`.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        if !inner.closed {
            inner.closed = true;
            self.notify.notify_waiters();
        }
    }

    /// The index within `available` `GetNext` would take next, honoring
    /// `min_packs` (warm-up floor) and `buffer_size` (reserve margin).
    fn eligible_index(&self, available: &[Account]) -> Option<usize> {
        let eligible: Vec<usize> = available
            .iter()
            .enumerate()
            .filter(|(_, account)| account.packs_opened >= self.config.min_packs)
            .map(|(index, _)| index)
            .collect();
        if eligible.len() <= self.config.buffer_size {
            return None;
        }
        eligible
            .into_iter()
            .max_by(|&a, &b| self.config.sort_method.compare(&available[a], &available[b]))
    }

    async fn checkout_next(&self) -> Result<PooledAccountRef, AccountsError> {
        let deadline = self.config.max_wait_time.map(|wait| tokio::time::Instant::now() + wait);
        loop {
            {
                let mut inner = self.inner.lock();
                if inner.closed {
                    return Err(AccountsError::Closed);
                }
                if let Some(index) = self.eligible_index(&inner.available) {
                    let mut account = inner.available.remove(index);
                    account.status = AccountStatus::InUse;
                    account.assigned_at = Some(Utc::now());
                    account.modified_at = Utc::now();
                    let reference = PooledAccountRef {
                        id: account.id.clone(),
                        device_account: account.device_account.clone(),
                    };
                    inner.in_use.insert(account.id.clone(), account);
                    return Ok(reference);
                }
            }

            if !self.config.wait_for_accounts {
                return Err(AccountsError::NoneAvailable);
            }

            match deadline {
                Some(deadline) => {
                    tokio::time::timeout_at(deadline, self.notify.notified())
                        .await
                        .map_err(|_| AccountsError::NoneAvailable)?;
                }
                None => self.notify.notified().await,
            }
        }
    }

    fn take_checked_out(&self, id: &str) -> Result<Account, AccountsError> {
        let mut inner = self.inner.lock();
        inner
            .in_use
            .shift_remove(id)
            .ok_or_else(|| AccountsError::NotFound(id.to_string()))
    }

    /// Returns a checked-out account to the available set without
    /// recording a result.
    pub fn return_account(&self, id: &str) -> Result<(), AccountsError> {
        let mut account = self.take_checked_out(id)?;
        account.status = AccountStatus::Available;
        account.assigned_to = None;
        account.assigned_at = None;
        account.modified_at = Utc::now();
        let mut inner = self.inner.lock();
        inner.available.push(account);
        drop(inner);
        self.notify.notify_one();
        Ok(())
    }

    /// Marks a checked-out account completed, recording its outcome.
    pub fn mark_used(&self, id: &str, outcome: AccountOutcome, bot_instance: &str) -> Result<(), AccountsError> {
        let mut account = self.take_checked_out(id)?;
        account.status = AccountStatus::Completed;
        account.modified_at = Utc::now();
        account.packs_opened += outcome.packs_opened;
        let result = AccountResult {
            success: outcome.success,
            packs_opened: outcome.packs_opened,
            cards_found: outcome.cards_found,
            stars_total: outcome.stars_total,
            keep_count: outcome.keep_count,
            error: outcome.error,
            timestamp: Utc::now(),
            bot_instance: bot_instance.to_string(),
            duration_ms: outcome.duration_ms,
        };
        let mut inner = self.inner.lock();
        inner.results.push((account.id.clone(), result));
        inner.completed.insert(account.id.clone(), account);
        Ok(())
    }

    /// Marks a checked-out account failed, recording the reason. Re-queues
    /// it to the available set instead of a terminal state when
    /// `retry_failed` is set and the failure count hasn't reached
    /// `max_failures`.
    pub fn mark_failed(&self, id: &str, reason: &str, bot_instance: &str) -> Result<(), AccountsError> {
        let mut account = self.take_checked_out(id)?;
        account.failure_count += 1;
        account.modified_at = Utc::now();
        let result = AccountResult {
            success: false,
            packs_opened: 0,
            cards_found: 0,
            stars_total: 0,
            keep_count: 0,
            error: Some(reason.to_string()),
            timestamp: Utc::now(),
            bot_instance: bot_instance.to_string(),
            duration_ms: 0,
        };

        let mut inner = self.inner.lock();
        inner.results.push((account.id.clone(), result));
        if self.config.retry_failed && account.failure_count < self.config.max_failures {
            account.status = AccountStatus::Available;
            account.assigned_to = None;
            account.assigned_at = None;
            drop(inner);
            self.inner.lock().available.push(account);
            self.notify.notify_one();
        } else {
            account.status = AccountStatus::Failed;
            inner.failed.insert(account.id.clone(), account);
        }
        Ok(())
    }
}

/// A snapshot of the pool's per-state counts and total recorded results.
#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    /// Accounts currently eligible for `GetNext`.
    pub available: usize,
    /// Accounts currently checked out.
    pub in_use: usize,
    /// Accounts that ran to completion.
    pub completed: usize,
    /// Accounts that exhausted their retry budget.
    pub failed: usize,
    /// Total `MarkUsed`/`MarkFailed` outcomes recorded so far.
    pub results_recorded: usize,
}

#[async_trait]
impl AccountPoolHandle for AccountPool {
    async fn get_next(&self) -> Result<PooledAccountRef, InterfaceError> {
        self.checkout_next().await.map_err(Into::into)
    }

    async fn return_account(&self, id: &str) -> Result<(), InterfaceError> {
        AccountPool::return_account(self, id).map_err(Into::into)
    }

    async fn mark_used(&self, id: &str, outcome: AccountOutcome) -> Result<(), InterfaceError> {
        AccountPool::mark_used(self, id, outcome, "unknown").map_err(Into::into)
    }

    async fn mark_failed(&self, id: &str, reason: &str) -> Result<(), InterfaceError> {
        AccountPool::mark_failed(self, id, reason, "unknown").map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Account;

    fn seeded_pool(count: usize) -> Arc<AccountPool> {
        let accounts = (0..count)
            .map(|i| Account::new(format!("acct-{i}"), format!("dev-{i}"), Utc::now()))
            .collect();
        AccountPool::new(accounts, PoolConfig::default())
    }

    #[tokio::test]
    async fn get_next_moves_account_to_in_use() {
        let pool = seeded_pool(2);
        let reference = pool.get_next().await.unwrap();
        let stats = pool.get_stats();
        assert_eq!(stats.available, 1);
        assert_eq!(stats.in_use, 1);
        assert!(reference.id.starts_with("acct-"));
    }

    #[tokio::test]
    async fn return_account_moves_back_to_available() {
        let pool = seeded_pool(1);
        let reference = pool.get_next().await.unwrap();
        AccountPool::return_account(&pool, &reference.id).unwrap();
        assert_eq!(pool.get_stats().available, 1);
        assert_eq!(pool.get_stats().in_use, 0);
    }

    #[tokio::test]
    async fn mark_failed_without_retry_is_terminal() {
        let pool = seeded_pool(1);
        let reference = pool.get_next().await.unwrap();
        AccountPool::mark_failed(&pool, &reference.id, "boom", "bot-1").unwrap();
        let stats = pool.get_stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.available, 0);
    }

    #[tokio::test]
    async fn mark_failed_with_retry_requeues_until_threshold() {
        let accounts = vec![Account::new("acct-0", "dev-0", Utc::now())];
        let pool = AccountPool::new(
            accounts,
            PoolConfig {
                retry_failed: true,
                max_failures: 2,
                ..PoolConfig::default()
            },
        );

        let reference = pool.get_next().await.unwrap();
        AccountPool::mark_failed(&pool, &reference.id, "boom", "bot-1").unwrap();
        assert_eq!(pool.get_stats().available, 1);

        let reference = pool.get_next().await.unwrap();
        AccountPool::mark_failed(&pool, &reference.id, "boom again", "bot-1").unwrap();
        assert_eq!(pool.get_stats().failed, 1);
    }

    #[tokio::test]
    async fn closed_pool_rejects_get_next() {
        let pool = seeded_pool(0);
        pool.close();
        let err = pool.get_next().await.unwrap_err();
        assert_eq!(err.to_string(), "account pool is closed");
    }

    #[tokio::test]
    async fn get_next_blocks_until_seeded() {
        let pool = seeded_pool(0);
        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.get_next().await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        pool.seed(Account::new("late", "dev-late", Utc::now()));
        let reference = waiter.await.unwrap().unwrap();
        assert_eq!(reference.id, "late");
    }

    #[tokio::test]
    async fn wait_disabled_returns_none_available_immediately() {
        let pool = AccountPool::new(
            Vec::new(),
            PoolConfig {
                wait_for_accounts: false,
                ..PoolConfig::default()
            },
        );
        let err = pool.get_next().await.unwrap_err();
        assert_eq!(err, AccountsError::NoneAvailable);
    }

    #[tokio::test(start_paused = true)]
    async fn max_wait_time_expires_to_none_available() {
        let pool = AccountPool::new(
            Vec::new(),
            PoolConfig {
                max_wait_time: Some(std::time::Duration::from_secs(1)),
                ..PoolConfig::default()
            },
        );
        let err = pool.get_next().await.unwrap_err();
        assert_eq!(err, AccountsError::NoneAvailable);
    }

    #[tokio::test]
    async fn min_packs_holds_back_unwarmed_accounts() {
        let pool = AccountPool::new(
            vec![Account::new("fresh", "dev-fresh", Utc::now())],
            PoolConfig {
                min_packs: 1,
                wait_for_accounts: false,
                ..PoolConfig::default()
            },
        );
        let err = pool.get_next().await.unwrap_err();
        assert_eq!(err, AccountsError::NoneAvailable);
    }

    #[tokio::test]
    async fn buffer_size_reserves_accounts_from_checkout() {
        let reserved = AccountPool::new(
            vec![Account::new("acct-0", "dev-0", Utc::now())],
            PoolConfig {
                buffer_size: 1,
                wait_for_accounts: false,
                ..PoolConfig::default()
            },
        );
        let err = reserved.get_next().await.unwrap_err();
        assert_eq!(err, AccountsError::NoneAvailable);
    }
}
