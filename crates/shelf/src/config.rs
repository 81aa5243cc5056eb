//! Sync configuration

use serde::Deserialize;
use tracing::warn;

/// Remote record stores cap the number of records per modify request
pub const DEFAULT_MAX_BATCH_SIZE: usize = 400;

pub const DEFAULT_LOG_FILTER: &str = "info";

const MAX_BATCH_SIZE_VAR: &str = "SHELF_SYNC_MAX_BATCH_SIZE";
const LOG_FILTER_VAR: &str = "SHELF_SYNC_LOG";

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Most entities uploaded in a single pass by `push_pending`
    pub max_batch_size: usize,
    /// Fallback `EnvFilter` directive when `RUST_LOG` is not set
    pub log_filter: String,
}

impl SyncConfig {
    pub fn new(max_batch_size: usize) -> Self {
        Self {
            max_batch_size,
            ..Self::default()
        }
    }

    /// Read overrides from `SHELF_SYNC_MAX_BATCH_SIZE` and `SHELF_SYNC_LOG`
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(MAX_BATCH_SIZE_VAR) {
            match raw.trim().parse::<usize>() {
                Ok(size) if size > 0 => config.max_batch_size = size,
                _ => warn!(
                    "[SyncConfig] Ignoring invalid {}={:?}, using {}",
                    MAX_BATCH_SIZE_VAR, raw, config.max_batch_size
                ),
            }
        }

        if let Some(filter) = lookup(LOG_FILTER_VAR) {
            if !filter.trim().is_empty() {
                config.log_filter = filter;
            }
        }

        config
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}
