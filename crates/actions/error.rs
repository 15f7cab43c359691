use routine_controller::ControllerError;
use routine_interfaces::InterfaceError;
use routine_variables::InterpolationError;
use thiserror::Error;

/// Errors raised while validating, building, or executing an Action.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ActionError {
    /// A `Validate` call rejected the action's own fields or a nested
    /// child's fields. Carries the full nested path per the loader's
    /// `"parent -> nested action N: ..."` convention.
    #[error("{0}")]
    Validation(String),
    /// A validation error was deferred to first execution because the
    /// Step that captured it was built anyway (e.g. for diagnostics).
    #[error("build configuration error for step '{step}': {cause}")]
    StepIssue {
        /// The offending step's name.
        step: String,
        /// The deferred validation message.
        cause: String,
    },
    /// `Break` fired; absorbed by the innermost enclosing loop.
    #[error(transparent)]
    Break(#[from] ControllerError),
    /// A named template is not registered.
    #[error("template '{0}' not found in registry")]
    TemplateNotFound(String),
    /// Interpolating a string field failed.
    #[error(transparent)]
    Interpolation(#[from] InterpolationError),
    /// A referenced variable does not exist.
    #[error("undefined variable: {0}")]
    VariableUndefined(String),
    /// A numeric comparator operand did not parse as a 64-bit float.
    #[error("not a number: {0}")]
    NotANumber(String),
    /// A bounded loop exceeded `max_attempts`.
    #[error("exceeded max attempts ({0})")]
    MaxAttemptsExceeded(u32),
    /// A `WaitForImage`/`Until*` primitive exceeded its timeout.
    #[error("timed out waiting for '{0}'")]
    Timeout(String),
    /// No account pool is configured on this bot.
    #[error("no account pool configured")]
    NoAccountPool,
    /// No database is configured on this bot.
    #[error("no database configured")]
    NoDatabase,
    /// A named sub-routine could not be resolved or executing it failed.
    #[error("sub-routine '{routine}' failed: {cause}")]
    SubRoutine {
        /// The sub-routine's name.
        routine: String,
        /// The wrapped failure.
        cause: String,
    },
    /// A lower collaborator (`Adb`/`Cv`/`Database`) returned an error.
    #[error(transparent)]
    Interface(#[from] InterfaceError),
}

impl ActionError {
    /// True if this is the sentinel used by loop control flow to unwind
    /// exactly one enclosing loop.
    #[must_use]
    pub fn is_break(&self) -> bool {
        matches!(self, Self::Break(ControllerError::BreakLoop))
    }

    /// True if this is the sentinel for a controller-initiated stop.
    #[must_use]
    pub fn is_stopped_by_controller(&self) -> bool {
        matches!(self, Self::Break(ControllerError::StoppedByController))
    }

    /// Wraps this error with a nested-path prefix, matching the loader's
    /// `"parent -> nested action N: ..."` convention for validation errors.
    #[must_use]
    pub fn with_path_prefix(self, prefix: &str) -> Self {
        match self {
            Self::Validation(msg) => Self::Validation(format!("{prefix}: {msg}")),
            other => Self::Validation(format!("{prefix}: {other}")),
        }
    }
}
