#![deny(clippy::all, missing_docs, rust_2018_idioms)]

//! External collaborator traits the runtime executes through — device
//! input, visual matching, screen capture, and account persistence — plus
//! in-memory fakes of each for use by every other crate's test suite.

/// Screen coordinates, regions, and color samples shared by `cv` and `adb`.
#[path = "../geometry.rs"]
pub mod geometry;

/// The coarse error type every trait in this crate returns.
#[path = "../error.rs"]
pub mod error;

/// Device input and app lifecycle control.
#[path = "../adb.rs"]
pub mod adb;

/// Visual template matching.
#[path = "../cv.rs"]
pub mod cv;

/// Screen capture.
#[path = "../capture.rs"]
pub mod capture;

/// Account checkout bookkeeping and allow-listed field access.
#[path = "../database.rs"]
pub mod database;

/// The account-pool seam consumed by account-lifecycle actions.
#[path = "../account_pool.rs"]
pub mod account_pool;

pub use account_pool::{AccountOutcome, AccountPoolHandle, PooledAccountRef};
pub use adb::{Adb, AdbCall, FakeAdb};
pub use capture::{Capture, FakeCapture, Frame};
pub use cv::{Cv, FakeCv, MatchConfig, TemplateMatch};
pub use database::{AccountField, CheckoutHolder, Database, InMemoryDatabase};
pub use error::InterfaceError;
pub use geometry::{Color, Point, Region};

/// Commonly imported names for implementors that need the full interface
/// surface at once.
pub mod prelude {
    pub use crate::account_pool::{AccountOutcome, AccountPoolHandle, PooledAccountRef};
    pub use crate::adb::{Adb, AdbCall, FakeAdb};
    pub use crate::capture::{Capture, FakeCapture, Frame};
    pub use crate::cv::{Cv, FakeCv, MatchConfig, TemplateMatch};
    pub use crate::database::{AccountField, CheckoutHolder, Database, InMemoryDatabase};
    pub use crate::error::InterfaceError;
    pub use crate::geometry::{Color, Point, Region};
}
