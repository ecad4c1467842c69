/*!
 * Allocator Configuration
 *
 * Defaults, JSON files and `LIFEALLOC_*` environment variables.
 */

use super::types::LifetimeClass;
use crate::core::limits::{
    DEFAULT_LIFETIME_CLASS, DEFAULT_RECLAIM_BATCH, DEFAULT_REGION_CAPACITY,
    DEFAULT_SYNC_INTERVAL_MS,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// When a block whose count reached zero goes back to the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ReclaimPolicy {
    /// Reclaim inside the release that drove the count to zero
    #[default]
    Immediate,
    /// Queue on the ledger; reclaim a whole batch under one global-lock hold
    Batched { batch_size: usize },
}

/// Allocator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct AllocatorConfig {
    pub reclaim: ReclaimPolicy,
    /// Background synchronizer period
    pub sync_interval_ms: u64,
    /// Class used by the default classifier for empty contexts
    pub default_class: LifetimeClass,
    /// Initial capacity of each region's live-block map
    pub region_capacity_hint: usize,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            reclaim: ReclaimPolicy::Immediate,
            sync_interval_ms: DEFAULT_SYNC_INTERVAL_MS,
            default_class: DEFAULT_LIFETIME_CLASS,
            region_capacity_hint: DEFAULT_REGION_CAPACITY,
        }
    }
}

impl AllocatorConfig {
    /// Batched reclamation with the default batch size
    pub fn batched() -> Self {
        Self {
            reclaim: ReclaimPolicy::Batched {
                batch_size: DEFAULT_RECLAIM_BATCH,
            },
            ..Self::default()
        }
    }

    pub fn with_reclaim(mut self, reclaim: ReclaimPolicy) -> Self {
        self.reclaim = reclaim;
        self
    }

    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_default_class(mut self, class: LifetimeClass) -> Self {
        self.default_class = class;
        self
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Defaults overridden by environment variables
    ///
    /// - `LIFEALLOC_RECLAIM`: `immediate` or `batched`
    /// - `LIFEALLOC_BATCH_SIZE`: batch size (implies `batched`)
    /// - `LIFEALLOC_SYNC_INTERVAL_MS`: synchronizer period
    /// - `LIFEALLOC_DEFAULT_CLASS`: `short`, `medium` or `long`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let batch_size = match std::env::var("LIFEALLOC_BATCH_SIZE") {
            Ok(raw) => Some(parse_env("LIFEALLOC_BATCH_SIZE", &raw)?),
            Err(_) => None,
        };

        if let Ok(mode) = std::env::var("LIFEALLOC_RECLAIM") {
            config.reclaim = match mode.trim().to_ascii_lowercase().as_str() {
                "immediate" => ReclaimPolicy::Immediate,
                "batched" => ReclaimPolicy::Batched {
                    batch_size: batch_size.unwrap_or(DEFAULT_RECLAIM_BATCH),
                },
                other => {
                    return Err(ConfigError::Invalid {
                        key: "LIFEALLOC_RECLAIM",
                        reason: format!("unknown mode '{}'", other),
                    })
                }
            };
        } else if let Some(batch_size) = batch_size {
            config.reclaim = ReclaimPolicy::Batched { batch_size };
        }

        if let Ok(raw) = std::env::var("LIFEALLOC_SYNC_INTERVAL_MS") {
            config.sync_interval_ms = parse_env("LIFEALLOC_SYNC_INTERVAL_MS", &raw)?;
        }

        if let Ok(raw) = std::env::var("LIFEALLOC_DEFAULT_CLASS") {
            config.default_class = raw.parse().map_err(|reason| ConfigError::Invalid {
                key: "LIFEALLOC_DEFAULT_CLASS",
                reason,
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let ReclaimPolicy::Batched { batch_size: 0 } = self.reclaim {
            return Err(ConfigError::Invalid {
                key: "batch_size",
                reason: "must be at least 1".into(),
            });
        }
        if self.sync_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "sync_interval_ms",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })
}
