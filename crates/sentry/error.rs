use routine_actions::ActionError;
use thiserror::Error;

/// Errors raised while registering, ticking, or tearing down a sentry.
#[derive(Debug, Error)]
pub enum SentryError {
    /// The named routine isn't registered under the routine registry this
    /// sentry was told to resolve it against.
    #[error("sentry routine '{0}' not found")]
    RoutineNotFound(String),
    /// A tick's compiled routine failed partway through.
    #[error(transparent)]
    Action(#[from] ActionError),
}
