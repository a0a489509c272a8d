//! Tracing subscriber setup for the binary.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` overrides `default_level`.
///
/// Events go to stderr so command output on stdout stays parseable.
/// Calling this twice is harmless; the second call does nothing.
pub fn init(default_level: &str) {
    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}
