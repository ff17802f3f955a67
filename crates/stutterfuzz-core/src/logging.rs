//! Logging init: stderr with an env-driven filter.

use tracing_subscriber::EnvFilter;

/// Initialize structured logging to stderr, honoring `RUST_LOG` (default
/// `info`). Progress lines share stderr with the logs so stdout carries
/// nothing but the final summary.
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}
