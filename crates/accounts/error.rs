use routine_interfaces::InterfaceError;
use thiserror::Error;

/// Errors raised by the account pool's own bookkeeping, before crossing
/// into the `AccountPoolHandle` seam.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccountsError {
    /// `close()` was called; every blocked and future `GetNext` observes
    /// this literal text, which calling actions pattern-match on.
    #[error("account pool is closed")]
    Closed,
    /// No account could be assigned even after the configured number of
    /// checkout-conflict retries.
    #[error("no accounts available")]
    NoneAvailable,
    /// `GetByID`/`Return`/`MarkUsed`/`MarkFailed` named an id not tracked
    /// by this pool.
    #[error("account '{0}' not found")]
    NotFound(String),
}

impl From<AccountsError> for InterfaceError {
    fn from(err: AccountsError) -> Self {
        InterfaceError::Other(err.to_string())
    }
}
