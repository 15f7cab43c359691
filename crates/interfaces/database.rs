use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::InterfaceError;

/// The fixed set of account columns that `update_field`/`get_field` may
/// touch. Any other name is rejected before reaching a backend, since the
/// database trait is a thin generic UPDATE/SELECT shim, not a query
/// builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountField {
    /// Packs opened this session.
    PacksOpened,
    /// Shinedust currency total.
    Shinedust,
    /// Hourglasses currency total.
    Hourglasses,
    /// Wonder Picks total.
    WonderPicks,
    /// Timestamp (RFC 3339) of last use.
    LastUsedAt,
    /// Timestamp (RFC 3339) of completion.
    CompletedAt,
    /// Pool membership status string.
    PoolStatus,
    /// Consecutive failure counter.
    FailureCount,
    /// Last error message recorded against the account.
    LastError,
    /// The backing device-account identifier.
    DeviceAccount,
}

impl AccountField {
    /// The column name as stored/queried against a backend.
    #[must_use]
    pub fn column_name(self) -> &'static str {
        match self {
            Self::PacksOpened => "packs_opened",
            Self::Shinedust => "shinedust",
            Self::Hourglasses => "hourglasses",
            Self::WonderPicks => "wonder_picks",
            Self::LastUsedAt => "last_used_at",
            Self::CompletedAt => "completed_at",
            Self::PoolStatus => "pool_status",
            Self::FailureCount => "failure_count",
            Self::LastError => "last_error",
            Self::DeviceAccount => "device_account",
        }
    }
}

/// Who currently holds a checked-out account, per `is_account_checked_out`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutHolder {
    /// The orchestration id that holds the checkout.
    pub orchestration_id: String,
    /// The bot instance identifier that holds the checkout.
    pub instance: String,
}

/// Cross-process account bookkeeping and a narrow, allow-listed key-value
/// surface onto account rows. The concrete storage engine is out of scope;
/// this trait is the seam `routine-accounts` and the database-backed
/// Actions execute through.
#[async_trait]
pub trait Database: Send + Sync {
    /// Marks a device account as checked out by this orchestration/instance.
    async fn checkout_account(
        &self,
        device_account: &str,
        orchestration_id: &str,
        instance: &str,
    ) -> Result<(), InterfaceError>;
    /// Releases a checkout previously taken by this orchestration.
    async fn release_account(
        &self,
        device_account: &str,
        orchestration_id: &str,
    ) -> Result<(), InterfaceError>;
    /// Reports who, if anyone, currently holds the account's checkout.
    async fn is_account_checked_out(
        &self,
        device_account: &str,
    ) -> Result<Option<CheckoutHolder>, InterfaceError>;
    /// Resolves an account's id from its device-account identifier.
    async fn get_account_id_by_device_account(
        &self,
        device_account: &str,
    ) -> Result<Option<String>, InterfaceError>;
    /// Records packs/picks progress against a routine execution id.
    async fn update_routine_execution_metrics(
        &self,
        execution_id: &str,
        packs: i64,
        picks: i64,
    ) -> Result<(), InterfaceError>;
    /// Updates a single allow-listed column on an account row.
    async fn update_field(
        &self,
        account_id: &str,
        field: AccountField,
        value: &str,
    ) -> Result<(), InterfaceError>;
    /// Reads a single allow-listed column from an account row.
    async fn get_field(
        &self,
        account_id: &str,
        field: AccountField,
    ) -> Result<Option<String>, InterfaceError>;
}

#[derive(Default)]
struct AccountRow {
    fields: IndexMap<AccountField, String>,
}

/// In-memory `Database` fake: one map of account id to field values, plus a
/// checkout table keyed by device account.
#[derive(Default)]
pub struct InMemoryDatabase {
    rows: Mutex<IndexMap<String, AccountRow>>,
    device_to_id: Mutex<IndexMap<String, String>>,
    checkouts: Mutex<IndexMap<String, CheckoutHolder>>,
    metrics: Mutex<Vec<(String, i64, i64)>>,
}

impl InMemoryDatabase {
    /// Creates an empty fake.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an account row, registering its device-account mapping.
    pub fn seed_account(&self, account_id: &str, device_account: &str) {
        self.device_to_id
            .lock()
            .insert(device_account.to_string(), account_id.to_string());
        self.rows
            .lock()
            .entry(account_id.to_string())
            .or_default();
    }

    /// Every `(execution_id, packs, picks)` triple recorded so far.
    #[must_use]
    pub fn recorded_metrics(&self) -> Vec<(String, i64, i64)> {
        self.metrics.lock().clone()
    }
}

#[async_trait]
impl Database for InMemoryDatabase {
    async fn checkout_account(
        &self,
        device_account: &str,
        orchestration_id: &str,
        instance: &str,
    ) -> Result<(), InterfaceError> {
        self.checkouts.lock().insert(
            device_account.to_string(),
            CheckoutHolder {
                orchestration_id: orchestration_id.to_string(),
                instance: instance.to_string(),
            },
        );
        Ok(())
    }

    async fn release_account(
        &self,
        device_account: &str,
        orchestration_id: &str,
    ) -> Result<(), InterfaceError> {
        let mut checkouts = self.checkouts.lock();
        if let Some(holder) = checkouts.get(device_account) {
            if holder.orchestration_id == orchestration_id {
                checkouts.shift_remove(device_account);
            }
        }
        Ok(())
    }

    async fn is_account_checked_out(
        &self,
        device_account: &str,
    ) -> Result<Option<CheckoutHolder>, InterfaceError> {
        Ok(self.checkouts.lock().get(device_account).cloned())
    }

    async fn get_account_id_by_device_account(
        &self,
        device_account: &str,
    ) -> Result<Option<String>, InterfaceError> {
        Ok(self.device_to_id.lock().get(device_account).cloned())
    }

    async fn update_routine_execution_metrics(
        &self,
        execution_id: &str,
        packs: i64,
        picks: i64,
    ) -> Result<(), InterfaceError> {
        self.metrics
            .lock()
            .push((execution_id.to_string(), packs, picks));
        Ok(())
    }

    async fn update_field(
        &self,
        account_id: &str,
        field: AccountField,
        value: &str,
    ) -> Result<(), InterfaceError> {
        let mut rows = self.rows.lock();
        let row = rows.entry(account_id.to_string()).or_default();
        row.fields.insert(field, value.to_string());
        Ok(())
    }

    async fn get_field(
        &self,
        account_id: &str,
        field: AccountField,
    ) -> Result<Option<String>, InterfaceError> {
        Ok(self
            .rows
            .lock()
            .get(account_id)
            .and_then(|row| row.fields.get(&field).cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn checkout_then_release_clears_holder() {
        let db = InMemoryDatabase::new();
        db.checkout_account("dev-1", "orch-a", "bot-1").await.unwrap();
        assert!(db.is_account_checked_out("dev-1").await.unwrap().is_some());
        db.release_account("dev-1", "orch-a").await.unwrap();
        assert!(db.is_account_checked_out("dev-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn release_by_wrong_orchestration_is_a_no_op() {
        let db = InMemoryDatabase::new();
        db.checkout_account("dev-1", "orch-a", "bot-1").await.unwrap();
        db.release_account("dev-1", "orch-b").await.unwrap();
        assert!(db.is_account_checked_out("dev-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn update_field_then_get_field_round_trips() {
        let db = InMemoryDatabase::new();
        db.update_field("acct-1", AccountField::PacksOpened, "12")
            .await
            .unwrap();
        let value = db.get_field("acct-1", AccountField::PacksOpened).await.unwrap();
        assert_eq!(value.as_deref(), Some("12"));
        assert!(db
            .get_field("acct-1", AccountField::LastError)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn seeded_device_account_resolves_to_id() {
        let db = InMemoryDatabase::new();
        db.seed_account("acct-1", "dev-1");
        let id = db.get_account_id_by_device_account("dev-1").await.unwrap();
        assert_eq!(id.as_deref(), Some("acct-1"));
    }
}
