//! Tracing setup for hosts embedding the playground.

use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::prelude::*;

/// Environment variable holding the filter directives, e.g. `stylepen=debug`.
pub const LOG_ENV: &str = "STYLEPEN_LOG";

/// Install a compact stderr subscriber filtered by `STYLEPEN_LOG` (default `warn`).
///
/// Safe to call more than once; later calls are no-ops, as is calling it
/// after the host installed its own global subscriber.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact();

    let _ = tracing_subscriber::registry()
        .with(fmt_layer.with_filter(filter))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_tracing();
        init_tracing();
        tracing::debug!("still alive");
    }
}
