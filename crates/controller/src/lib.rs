#![deny(clippy::all, missing_docs, rust_2018_idioms)]

//! Per-bot cooperative state machine gating routine step execution.

/// State machine, checkpoints, and blocking waits.
#[path = "../state.rs"]
pub mod state;

/// Errors the controller and its callers surface.
#[path = "../error.rs"]
pub mod error;

pub use error::ControllerError;
pub use state::{CheckOutcome, RoutineController, RoutineState};
