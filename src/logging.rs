//! Tracing subscriber setup for the `ccsieve` binary.
//!
//! Filter priority, highest first:
//!
//! 1. `CCSIEVE_LOG` (directives, e.g. `ccsieve=debug,reqwest=warn`)
//! 2. `RUST_LOG`
//! 3. `--verbose` → `debug`, otherwise `info`

use std::io::IsTerminal;
use tracing::Level;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Project-specific filter variable.
pub const LOG_ENV: &str = "CCSIEVE_LOG";

/// Installs the global subscriber writing to stderr.
///
/// A second call is a no-op.
pub fn init(verbose: bool) {
    let filter = build_env_filter(verbose);
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(verbose);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

fn build_env_filter(verbose: bool) -> EnvFilter {
    if let Ok(directives) = std::env::var(LOG_ENV) {
        if let Ok(filter) = EnvFilter::try_new(&directives) {
            return filter;
        }
    }
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    EnvFilter::default().add_directive(default_level(verbose).into())
}

fn default_level(verbose: bool) -> Level {
    if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    }
}
