//! Diagnostic logging setup
//!
//! Library code only emits `tracing` events. The binary installs the
//! subscriber once at startup; diagnostics go to stderr so stdout stays
//! clean for command output and tool responses.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Environment variable holding the filter directives
pub const LOG_ENV: &str = "LEDGERWISE_LOG";

/// Filter used when `LEDGERWISE_LOG` is unset or invalid
pub const DEFAULT_FILTER: &str = "ledgerwise=info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber
///
/// Safe to call more than once; later calls are ignored.
pub fn init() {
    let stderr_log = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .with_filter(env_filter());

    // try_init fails only when a subscriber is already installed
    let _ = tracing_subscriber::registry().with(stderr_log).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init();
        init();
        tracing::info!("logging initialized");
    }
}
