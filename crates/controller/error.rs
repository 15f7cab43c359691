use thiserror::Error;

/// Errors raised by the [`crate::RoutineController`] gate and the
/// control-flow Steps that consult it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControllerError {
    /// A loop's `Break` action fired; caught and absorbed by the innermost
    /// enclosing loop, never seen outside `routine-actions`.
    #[error("break loop")]
    BreakLoop,
    /// `ForceStop` was called; the next checkpoint must abort execution.
    #[error("stopped by controller")]
    StoppedByController,
}
