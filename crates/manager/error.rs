use routine_actions::ActionError;
use routine_loader::LoaderError;
use thiserror::Error;

/// Errors raised by the [`crate::manager::Manager`] and the [`crate::bot::Bot`]
/// contexts it constructs.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// No bot is registered under this instance id.
    #[error("bot instance '{0}' not found")]
    InstanceNotFound(String),
    /// `create_bot` was called twice for the same instance id.
    #[error("bot instance '{0}' already exists")]
    InstanceAlreadyExists(String),
    /// The named routine could not be resolved or failed to compile.
    #[error(transparent)]
    Routine(#[from] LoaderError),
    /// A routine declares a required config param with no override and no
    /// default.
    #[error("missing required config param '{0}'")]
    MissingConfig(String),
    /// A step failed during execution.
    #[error(transparent)]
    Action(#[from] ActionError),
    /// `execute_with_restart` exhausted its policy's retry budget.
    #[error("routine failed after {attempts} attempt(s): {cause}")]
    RestartExhausted {
        /// Total attempts made, including the first.
        attempts: u32,
        /// The last attempt's failure.
        #[source]
        cause: Box<ManagerError>,
    },
}
