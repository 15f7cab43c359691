use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

/// Which of the pool's four states an account currently occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountStatus {
    /// Sitting in the pool, eligible for `GetNext`.
    Available,
    /// Checked out by a bot, not yet completed or failed.
    InUse,
    /// Ran to completion; a terminal state.
    Completed,
    /// Exhausted its retry budget; a terminal state.
    Failed,
}

/// One account tracked by the pool.
#[derive(Debug, Clone)]
pub struct Account {
    /// Stable id, independent of the backing device-account string.
    pub id: String,
    /// The backing device-account identifier seeded into a bot's variable
    /// store by `InjectNextAccount`.
    pub device_account: String,
    /// Current pool state.
    pub status: AccountStatus,
    /// The bot instance currently holding the account, if checked out.
    pub assigned_to: Option<String>,
    /// When the current checkout began, if any.
    pub assigned_at: Option<DateTime<Utc>>,
    /// Last time this account's state changed; the key `ModifiedAscending`
    /// sorts by.
    pub modified_at: DateTime<Utc>,
    /// Packs opened across this account's lifetime; the key
    /// `PacksDescending` sorts by.
    pub packs_opened: u32,
    /// Consecutive failures recorded via `MarkFailed`.
    pub failure_count: u32,
    /// Free-form bookkeeping not covered by the fields above.
    pub metadata: IndexMap<String, String>,
}

impl Account {
    /// Creates a fresh, available account with no history.
    #[must_use]
    pub fn new(id: impl Into<String>, device_account: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            device_account: device_account.into(),
            status: AccountStatus::Available,
            assigned_to: None,
            assigned_at: None,
            modified_at: created_at,
            packs_opened: 0,
            failure_count: 0,
            metadata: IndexMap::new(),
        }
    }

    /// Creates a fresh available account with a generated id, for callers
    /// seeding a pool from a bare list of device-account strings.
    #[must_use]
    pub fn generate(device_account: impl Into<String>) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), device_account, Utc::now())
    }
}

/// The outcome of one account's run, appended to the pool's result log by
/// `MarkUsed`/`MarkFailed`.
#[derive(Debug, Clone)]
pub struct AccountResult {
    /// Whether the run succeeded.
    pub success: bool,
    /// Packs opened during the run.
    pub packs_opened: u32,
    /// Cards found during the run.
    pub cards_found: u32,
    /// Stars earned during the run.
    pub stars_total: u32,
    /// Items kept during the run.
    pub keep_count: u32,
    /// The failure reason, if the run did not succeed.
    pub error: Option<String>,
    /// When this result was recorded.
    pub timestamp: DateTime<Utc>,
    /// The bot instance that produced this result.
    pub bot_instance: String,
    /// How long the run took.
    pub duration_ms: u64,
}

/// How `GetNext` picks among the available set.
#[derive(Clone)]
pub enum SortMethod {
    /// Highest `packs_opened` first.
    PacksDescending,
    /// Oldest `modified_at` first (least-recently-used).
    ModifiedAscending,
    /// An arbitrary total order, for pools with bespoke prioritization.
    Custom(Arc<dyn Fn(&Account, &Account) -> Ordering + Send + Sync>),
}

impl SortMethod {
    /// Picks the index of the best candidate in `accounts`, per this
    /// method's ordering, or `None` if `accounts` is empty.
    pub(crate) fn best_index(&self, accounts: &[Account]) -> Option<usize> {
        accounts
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| self.compare(a, b))
            .map(|(index, _)| index)
    }

    pub(crate) fn compare(&self, a: &Account, b: &Account) -> Ordering {
        match self {
            Self::PacksDescending => a.packs_opened.cmp(&b.packs_opened),
            Self::ModifiedAscending => b.modified_at.cmp(&a.modified_at),
            Self::Custom(compare) => compare(a, b),
        }
    }
}

impl fmt::Debug for SortMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PacksDescending => write!(f, "PacksDescending"),
            Self::ModifiedAscending => write!(f, "ModifiedAscending"),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl Default for SortMethod {
    fn default() -> Self {
        Self::ModifiedAscending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account_with(packs: u32, modified_secs_ago: i64) -> Account {
        let mut account = Account::new("id", "dev", Utc::now() - chrono::Duration::seconds(modified_secs_ago));
        account.packs_opened = packs;
        account
    }

    #[test]
    fn packs_descending_picks_highest() {
        let accounts = vec![account_with(1, 0), account_with(9, 0), account_with(4, 0)];
        let index = SortMethod::PacksDescending.best_index(&accounts).unwrap();
        assert_eq!(accounts[index].packs_opened, 9);
    }

    #[test]
    fn modified_ascending_picks_oldest() {
        let accounts = vec![account_with(0, 10), account_with(0, 100), account_with(0, 50)];
        let index = SortMethod::ModifiedAscending.best_index(&accounts).unwrap();
        assert_eq!(index, 1);
    }
}
