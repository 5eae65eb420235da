//! Shared helpers for fixture harness integration tests.
//!
//! The scheduler fixture is played by `/bin/sh`, which prints a readiness
//! line and then `exec`s into `sleep` so that killing the child stops the
//! whole stand-in.

#![allow(dead_code)]

use oasis_core::TestkitConfig;

/// Line the stand-in scheduler prints once it is up.
pub const READY_LINE: &str = "agent started";

/// Config whose scheduler is a shell script ending in `exec sleep 60`.
pub fn config_with_scheduler(script: &str) -> TestkitConfig {
    let mut config = TestkitConfig::default();
    config.cli.binary = "/bin/sh".to_owned();
    config.cli.args = vec!["-c".to_owned()];
    config.scheduler.binary = "/bin/sh".to_owned();
    config.scheduler.args = vec!["-c".to_owned(), script.to_owned()];
    config.scheduler.readiness = "log-line".to_owned();
    config.scheduler.ready_pattern = READY_LINE.to_owned();
    config.scheduler.ready_timeout_secs = 5;
    config.scheduler.stop_grace_secs = 5;
    config
}

/// Stand-in scheduler that becomes ready immediately.
pub fn config() -> TestkitConfig {
    config_with_scheduler(&format!("echo '{READY_LINE}'; exec sleep 60"))
}
