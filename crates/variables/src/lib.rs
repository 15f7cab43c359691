#![deny(clippy::all, missing_docs, rust_2018_idioms)]

//! Per-bot variable store and `${name}` interpolation.

/// Ordered, persistence-aware string store.
#[path = "../store.rs"]
pub mod store;

/// `${name}` placeholder resolution against a [`store::VariableStore`].
#[path = "../interpolate.rs"]
pub mod interpolate;

pub use interpolate::{
    interpolate, interpolate_or_default, interpolate_required, InterpolationError,
};
pub use store::VariableStore;
