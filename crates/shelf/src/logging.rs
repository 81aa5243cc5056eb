//! Tracing subscriber setup for hosts and tests

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::SyncConfig;

/// Install a global fmt subscriber.
///
/// `RUST_LOG` wins over `SyncConfig::log_filter`. Returns false when a
/// global subscriber was already installed, so it is safe to call from every
/// test.
pub fn init_tracing(config: &SyncConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .unwrap_or_else(|_| EnvFilter::new(crate::config::DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .is_ok()
}
