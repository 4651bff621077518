//! Runtime configuration types

use crate::{Error, ParallelismConfig, RemainderPolicy, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Rank group settings
    pub group: GroupConfig,

    /// Dataset settings
    pub dataset: DatasetConfig,

    /// Training loop settings
    pub training: TrainingConfig,

    /// Parallelism selector, identical on every rank
    pub parallelism: ParallelismConfig,

    /// Background synchronization settings
    pub sync: SyncConfig,
}

impl RuntimeConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: RuntimeConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    /// Check the invariants every rank relies on
    pub fn validate(&self) -> Result<()> {
        if self.group.world_size == 0 {
            return Err(invalid("group.world_size must be at least 1"));
        }
        if self.dataset.batch_size == 0 {
            return Err(invalid("dataset.batch_size must be at least 1"));
        }
        if self.training.epochs == 0 {
            return Err(invalid("training.epochs must be at least 1"));
        }
        if self.training.log_every == 0 {
            return Err(invalid("training.log_every must be at least 1"));
        }
        if self.training.layer_sizes.len() < 2 {
            return Err(invalid("training.layer_sizes needs an input and an output size"));
        }
        if self.training.layer_sizes.contains(&0) {
            return Err(invalid("training.layer_sizes entries must be non-zero"));
        }
        if self.sync.poll_interval.is_zero() {
            return Err(invalid("sync.poll_interval must be non-zero"));
        }
        if self.sync.runtime_threads == 0 {
            return Err(invalid("sync.runtime_threads must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> Error {
    Error::InvalidConfig {
        message: message.to_string(),
    }
}

/// Rank group configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupConfig {
    /// Number of ranks in the group
    pub world_size: usize,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self { world_size: 1 }
    }
}

/// Dataset configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Dataset root holding the four split directories
    pub path: String,

    /// Rows per training batch
    pub batch_size: usize,

    /// Handling of rows that do not fill a whole batch
    pub remainder: RemainderPolicy,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: "./data".to_string(),
            batch_size: 64,
            remainder: RemainderPolicy::Drop,
        }
    }
}

/// Training loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Number of passes over the local shards
    pub epochs: u64,

    /// Report metrics every N epochs
    pub log_every: u64,

    /// Layer widths, input first
    pub layer_sizes: Vec<usize>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 200,
            log_every: 1,
            layer_sizes: vec![4, 10, 10, 3],
        }
    }
}

/// Background synchronization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// How often the async helper polls the training state
    #[serde(with = "millis_serde")]
    pub poll_interval: Duration,

    /// Worker threads of the runtime hosting the helper
    pub runtime_threads: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            runtime_threads: 2,
        }
    }
}

/// Duration serialization as integer milliseconds
mod millis_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
