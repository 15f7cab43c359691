use thiserror::Error;

/// Errors surfaced by the external collaborator traits.
///
/// These are deliberately coarse: the concrete CV/ADB/database
/// implementations are out of scope and each owns a much richer error type
/// internally. What crosses this boundary is just enough detail for a Step
/// to decide whether to retry, wrap, or propagate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InterfaceError {
    /// The collaborator could not be reached (device offline, DB down).
    #[error("unavailable: {0}")]
    Unavailable(String),
    /// The requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The operation timed out.
    #[error("timed out: {0}")]
    Timeout(String),
    /// Catch-all for malformed input or backend-reported failure.
    #[error("{0}")]
    Other(String),
}
