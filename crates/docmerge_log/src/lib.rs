//! Shared logging setup for docmerge binaries.

use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt};

const C_LOG_FILTER_DEFAULT: &str = "docmerge=info,docmerge_batch=info";
const C_LOG_FILTER_VERBOSE: &str = "docmerge=debug,docmerge_batch=debug";

/// Logging configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogConfig {
    /// Raise the default filter to `debug`. `RUST_LOG` still wins when set.
    pub verbose: bool,
}

/// Install a stderr `fmt` subscriber filtered by `RUST_LOG` or the defaults.
///
/// Fails when a global subscriber is already installed.
pub fn init_logging(config: LogConfig) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(derive_env_filter(config))
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()
}

fn derive_env_filter(config: LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if config.verbose {
            C_LOG_FILTER_VERBOSE
        } else {
            C_LOG_FILTER_DEFAULT
        })
    })
}
