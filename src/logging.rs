//! Tracing subscriber setup for the `grow` binary.
//!
//! Log output goes to stderr so stdout stays clean for command output
//! (JSON for `history` and `series`). The filter is read from `GROW_LOG`
//! using `tracing-subscriber`'s `EnvFilter` syntax and defaults to `info`.

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "GROW_LOG";

/// Build the filter from `GROW_LOG`, falling back to `default_directive`.
pub fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Install the global subscriber. Safe to call more than once.
pub fn init(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::registry()
        .with(env_filter(default_directive))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}
