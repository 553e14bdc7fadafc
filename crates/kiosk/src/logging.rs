#![forbid(unsafe_code)]

//! Tracing subscriber setup for kiosk hosts.
//!
//! # Filter priority (highest to lowest)
//!
//! 1. `KIOSK_LOG` (per-target directives, e.g. `kiosk_runtime=debug,warn`)
//! 2. `RUST_LOG`
//! 3. `info`

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Environment variable holding kiosk log directives.
pub const LOG_ENV: &str = "KIOSK_LOG";

const DEFAULT_DIRECTIVE: &str = "info";

/// Build the filter: `KIOSK_LOG`, then `RUST_LOG`, then `info`. An
/// unparseable value falls through to the next source.
#[must_use]
pub fn env_filter() -> EnvFilter {
    filter_from(std::env::var(LOG_ENV).ok().as_deref())
}

fn filter_from(directives: Option<&str>) -> EnvFilter {
    if let Some(directives) = directives
        && let Ok(filter) = EnvFilter::try_new(directives)
    {
        return filter;
    }
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    EnvFilter::new(DEFAULT_DIRECTIVE)
}

/// Install a compact stderr subscriber as the global default.
///
/// Returns an error if a global subscriber is already set.
pub fn try_init() -> Result<(), tracing_subscriber::util::TryInitError> {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact();
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt_layer)
        .try_init()
}

/// Like [`try_init`], but a second call is a logged no-op.
pub fn init() {
    if let Err(err) = try_init() {
        tracing::debug!(error = %err, "tracing subscriber already installed");
    }
}
