//! Tracing subscriber setup.
//!
//! The library only emits `tracing` events; installing a subscriber is left to
//! the binary (or to tests that want to see the output).

use tracing::debug;
use tracing_subscriber::{EnvFilter, prelude::*};

use crate::config::LoggingConfig;

/// Install a compact fmt subscriber writing to stderr.
///
/// `RUST_LOG` takes precedence over `config.level`. An invalid configured level
/// falls back to `info`. Safe to call more than once; later calls are ignored.
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let result = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(config.show_target)
                .compact(),
        )
        .with(filter)
        .try_init();

    if result.is_err() {
        // Already initialized, common in tests
        debug!("tracing already initialized, skipping re-initialization");
    }
}
