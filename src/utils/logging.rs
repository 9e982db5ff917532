//! # Logging Setup
//!
//! The library itself only emits `tracing` events. Binaries, benchmarks and
//! tests that want to see them install a subscriber through this module.

use tracing_subscriber::EnvFilter;

#[derive(thiserror::Error, Debug)]
pub enum LoggingError {
    #[error("Could not install tracing subscriber: {0}")]
    Install(String),
}

fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Installs a global fmt subscriber.
///
/// The filter is read from `RUST_LOG`; `default_directive` (e.g. `"info"` or
/// `"rtorch_conv=debug"`) applies when the variable is unset or invalid.
/// Fails if a global subscriber is already installed.
pub fn init_tracing(default_directive: &str) -> Result<(), LoggingError> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_directive))
        .with_target(true)
        .try_init()
        .map_err(|e| LoggingError::Install(e.to_string()))
}

/// Like [`init_tracing`], but a subscriber that is already installed is not an error.
/// Output goes through the test writer so `cargo test` captures it.
pub fn try_init_tracing(default_directive: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_directive))
        .with_test_writer()
        .try_init();
}
