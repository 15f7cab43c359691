#![deny(clippy::all, missing_docs, rust_2018_idioms)]

//! Routine file parsing, action/condition lowering, and the namespace
//! registry bots and the manager resolve routine names against.

/// Load/parse/validation error type.
#[path = "../error.rs"]
pub mod error;

/// The on-disk routine record, deserialized before any action is built.
#[path = "../file.rs"]
pub mod file;

/// Lowers a parsed routine file into executable Steps.
#[path = "../compile.rs"]
pub mod compile;

/// Directory walk, namespace derivation, and the valid/invalid indexes.
#[path = "../registry.rs"]
pub mod registry;

pub use compile::{compile_routine_file, CompiledRoutine};
pub use error::LoaderError;
pub use file::{ConfigParam, ConfigParamType, RoutineFile, SentryAction, SentryRecord, SentrySeverity};
pub use registry::RoutineRegistry;
