//! Logging initialization for wa-sessions.
//!
//! Configures the `tracing` subscriber with level filtering via the
//! `WA_SESSIONS_LOG` environment variable. Falls back to the configured
//! `[logging] log_level` when the variable is unset.
//!
//! # Usage
//!
//! ```bash
//! # Debug level
//! WA_SESSIONS_LOG=debug wa-sessions accounts list
//!
//! # Module-specific filtering
//! WA_SESSIONS_LOG=wa_sessions::manager=trace,warn wa-sessions accounts list
//! ```

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::schema::LogLevel;

/// Environment variable holding filter directives.
pub const LOG_ENV: &str = "WA_SESSIONS_LOG";

/// Builds the filter from `WA_SESSIONS_LOG`, or `fallback` when unset or invalid.
pub fn filter(fallback: LogLevel) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback.as_directive()))
}

/// Initialize the tracing subscriber.
///
/// Output is written to stderr so that command output on stdout stays
/// machine-readable.
///
/// # Panics
///
/// Panics if a global subscriber has already been set (should only be
/// called once, at startup).
pub fn init(fallback: LogLevel) {
    fmt()
        .with_env_filter(filter(fallback))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
