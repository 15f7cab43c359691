use async_trait::async_trait;

use crate::error::InterfaceError;

/// A minimal, pool-agnostic view of a checked-out account, just enough for
/// an `Action` to read an id and seed `device_account_id` without the
/// `actions` crate depending on the concrete account-pool crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PooledAccountRef {
    /// The account's stable id.
    pub id: String,
    /// The backing device-account identifier.
    pub device_account: String,
}

/// The outcome an account-completing action records against the pool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountOutcome {
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
    /// The error message, if the run failed.
    pub error: Option<String>,
    /// How long the run took.
    pub duration_ms: u64,
}

/// The account-pool seam `Action`s execute account lifecycle ops through.
/// Implemented by the concrete account pool; kept here so `actions` never
/// depends on it directly, avoiding a crate cycle (the pool's fake/real
/// implementations depend on `interfaces`, not the other way around).
#[async_trait]
pub trait AccountPoolHandle: Send + Sync {
    /// Checks out the next available account, per the pool's sort method.
    async fn get_next(&self) -> Result<PooledAccountRef, InterfaceError>;
    /// Returns a checked-out account to the available set.
    async fn return_account(&self, id: &str) -> Result<(), InterfaceError>;
    /// Marks a checked-out account completed, recording its outcome.
    async fn mark_used(&self, id: &str, outcome: AccountOutcome) -> Result<(), InterfaceError>;
    /// Marks a checked-out account failed, recording the reason.
    async fn mark_failed(&self, id: &str, reason: &str) -> Result<(), InterfaceError>;
}
