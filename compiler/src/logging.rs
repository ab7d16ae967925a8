//! Tracing setup for the compiler binary.
//!
//! Diagnostics go to stderr so stdout stays reserved for compiled actions.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG` if set. Otherwise defaults to `warn`, or `compiler=info`
/// when `verbose` is requested.
///
/// # Example
/// ```bash
/// RUST_LOG=compiler=debug compiler run --instructions steps.txt
/// ```
pub fn init(verbose: bool) {
    let fallback = if verbose { "warn,compiler=info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
