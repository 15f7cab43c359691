use routine_actions::ActionError;
use thiserror::Error;

/// Errors raised while loading a single routine file or reloading the
/// registry.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// Reading a routine file from disk failed.
    #[error("reading '{path}': {source}")]
    Io {
        /// The file that could not be read.
        path: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// The file's YAML was malformed or didn't match the routine record
    /// shape.
    #[error("parsing '{path}': {source}")]
    Parse {
        /// The file that failed to parse.
        path: String,
        /// The underlying deserialization error.
        #[source]
        source: serde_yaml::Error,
    },
    /// `Validate` rejected an action or nested condition. Carries the full
    /// nested path per the `"action N: ..."` convention.
    #[error("{0}")]
    Validation(String),
    /// Lowering an action tree into Steps failed.
    #[error(transparent)]
    Action(#[from] ActionError),
    /// A name was looked up that isn't registered as a valid routine.
    #[error("routine '{0}' not found")]
    NotFound(String),
}
