//! Configuration of the sync manager.

use serde::{Deserialize, Serialize};
use std::env;

/// Environment variable overriding [`SyncManagerConfig::batch_size`].
pub const BATCH_SIZE_ENV: &str = "SMARTSYNC_BATCH_SIZE";
pub const DEFAULT_BATCH_SIZE: usize = 200;

/// Sync manager settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncManagerConfig {
    /// Record trees saved per batch; progress is reported after each batch
    pub batch_size: usize,
}

impl Default for SyncManagerConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl SyncManagerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let batch_size = match lookup(BATCH_SIZE_ENV) {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(size) if size > 0 => size,
                _ => return Err(ConfigError::InvalidBatchSize(raw)),
            },
            None => DEFAULT_BATCH_SIZE,
        };

        Ok(Self { batch_size })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

/// Configuration errors.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid SMARTSYNC_BATCH_SIZE value: {0:?}")]
    InvalidBatchSize(String),
}
