//! Fixture harness error types.
//!
//! [`HarnessError`] covers every failure the harness can hit while
//! provisioning or tearing down fixtures. All of them are fatal to the
//! current test (or suite); nothing is retried.
//! `From<HarnessError> for OasisError` lets callers above the harness
//! propagate with `?`.

use std::time::Duration;

use oasis_core::error::{FixtureError, OasisError};

/// Fixture harness domain error
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Directory create/remove failed
    #[error("filesystem error: {op} {path}: {reason}")]
    Filesystem {
        /// Operation that failed (create, remove)
        op: &'static str,
        /// Target path
        path: String,
        /// Underlying error
        reason: String,
    },

    /// Process could not be spawned
    #[error("failed to spawn '{name}': {reason}")]
    Spawn {
        /// Executable name
        name: String,
        /// Underlying error
        reason: String,
    },

    /// Process exited or lost its output before reporting readiness
    #[error("'{name}' did not become ready: {reason}")]
    NotReady {
        /// Executable name
        name: String,
        /// What went wrong
        reason: String,
    },

    /// Readiness was not reported within the timeout
    #[error("'{name}' not ready after {timeout:?}")]
    ReadyTimeout {
        /// Executable name
        name: String,
        /// Configured timeout
        timeout: Duration,
    },

    /// Suite lifetime token was cancelled while waiting for readiness
    #[error("start of '{name}' cancelled")]
    Cancelled {
        /// Executable name
        name: String,
    },

    /// Process could not be stopped
    #[error("failed to stop '{name}': {reason}")]
    Stop {
        /// Executable name
        name: String,
        /// Underlying error
        reason: String,
    },

    /// Process did not exit within the grace period
    #[error("'{name}' still running after {grace:?}")]
    StopTimeout {
        /// Executable name
        name: String,
        /// Configured grace period
        grace: Duration,
    },

    /// Lifecycle operation called in the wrong state
    #[error("cannot {operation} while suite is {state}")]
    InvalidTransition {
        /// Requested operation
        operation: &'static str,
        /// Current suite state
        state: String,
    },

    /// Several independent teardown steps failed
    #[error("teardown failed: {}", join_errors(.0))]
    Teardown(Vec<HarnessError>),

    /// Invalid testkit configuration
    #[error("config error: {0}")]
    Config(String),

    /// Tracing subscriber could not be installed
    #[error("logging error: {0}")]
    Logging(String),
}

fn join_errors(errors: &[HarnessError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<HarnessError> for OasisError {
    fn from(err: HarnessError) -> Self {
        let fixture = match &err {
            HarnessError::Filesystem { path, .. } => FixtureError::Filesystem {
                path: path.clone(),
                reason: err.to_string(),
            },
            HarnessError::Spawn { name, .. }
            | HarnessError::NotReady { name, .. }
            | HarnessError::ReadyTimeout { name, .. }
            | HarnessError::Cancelled { name }
            | HarnessError::Stop { name, .. }
            | HarnessError::StopTimeout { name, .. } => FixtureError::Process {
                name: name.clone(),
                reason: err.to_string(),
            },
            HarnessError::InvalidTransition { .. }
            | HarnessError::Teardown(_)
            | HarnessError::Config(_)
            | HarnessError::Logging(_) => FixtureError::Lifecycle(err.to_string()),
        };
        OasisError::Fixture(fixture)
    }
}
