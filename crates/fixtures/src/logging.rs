//! Logging initialization for test binaries.
//!
//! Configures `tracing-subscriber` from the `[general]` section of
//! `TestkitConfig`. Output goes through the libtest writer so it is
//! captured per test and only shown for failures.

use std::sync::Once;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use oasis_core::config::GeneralConfig;

use crate::error::HarnessError;

/// Initialize the global tracing subscriber.
///
/// Fails if a global subscriber is already set. `RUST_LOG` takes
/// precedence over `config.log_level`.
///
/// # Formats
///
/// * `"json"` - JSON lines
/// * `"pretty"` - multi-line human-readable output
/// * `"compact"` - single-line human-readable output
pub fn init_tracing(config: &GeneralConfig) -> Result<(), HarnessError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match config.log_format.as_str() {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json().with_test_writer())
            .try_init(),
        "pretty" => registry
            .with(tracing_subscriber::fmt::layer().pretty().with_test_writer())
            .try_init(),
        "compact" => registry
            .with(tracing_subscriber::fmt::layer().compact().with_test_writer())
            .try_init(),
        other => {
            return Err(HarnessError::Logging(format!(
                "unknown log format '{other}', expected 'json', 'pretty' or 'compact'"
            )));
        }
    };

    result.map_err(|e| {
        HarnessError::Logging(format!(
            "failed to initialize {} tracing subscriber: {e}",
            config.log_format
        ))
    })
}

/// Like [`init_tracing`], but safe to call from every test.
///
/// Only the first call installs a subscriber; later calls, and failures
/// caused by a subscriber installed elsewhere, are ignored.
pub fn try_init_tracing(config: &GeneralConfig) {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        if let Err(e) = init_tracing(config) {
            eprintln!("tracing not initialized: {e}");
        }
    });
}
