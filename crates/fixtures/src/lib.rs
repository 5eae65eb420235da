//! Fixture harness for oasis integration tests.
//!
//! A [`Suite`] declares once which [`Fixture`]s it wants and provisions
//! them around every test: an owner-only scratch directory, a background
//! scheduler server, and the registry mock (installed by the test itself
//! through `oasis-registry-mock`). Teardown runs on every exit path of a
//! test body, panics included.

pub mod error;
pub mod executable;
pub mod fixture;
pub mod logging;
pub mod scratch;
pub mod suite;

pub use error::HarnessError;
pub use executable::{BackgroundRun, CommandOutput, Executable, Readiness};
pub use fixture::{Fixture, FixtureSet};
pub use suite::{Suite, SuiteState, TestContext};
