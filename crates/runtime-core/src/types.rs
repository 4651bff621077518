//! Core type definitions for the distributed training runtime

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier types
pub type Rank = usize;
pub type ShardOrdinal = u64;

/// Training cursor counters
pub type Epoch = u64;
pub type BatchIndex = u64;

/// Position of the training loop: the batch currently being processed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrainingStatus {
    pub epoch: Epoch,
    pub batch: BatchIndex,
}

impl TrainingStatus {
    pub fn new(epoch: Epoch, batch: BatchIndex) -> Self {
        Self { epoch, batch }
    }
}

impl fmt::Display for TrainingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "epoch {} batch {}", self.epoch, self.batch)
    }
}

/// Terminal training position, fixed before the loop starts
///
/// Completion is detected by exact equality with a [`TrainingStatus`]; there
/// is no ordering between the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FinishSignal {
    pub epoch: Epoch,
    pub batch: BatchIndex,
}

impl FinishSignal {
    /// The last (epoch, batch) pair of a run with the given shape
    pub fn for_run(epochs: u64, batches_per_epoch: u64) -> Result<Self> {
        if epochs == 0 || batches_per_epoch == 0 {
            return Err(Error::InvalidConfig {
                message: format!(
                    "finish signal needs at least one epoch and one batch (epochs={}, batches={})",
                    epochs, batches_per_epoch
                ),
            });
        }

        Ok(Self {
            epoch: epochs - 1,
            batch: batches_per_epoch - 1,
        })
    }

    /// Returns true if the status is exactly the terminal position
    pub fn matches(&self, status: &TrainingStatus) -> bool {
        self.epoch == status.epoch && self.batch == status.batch
    }
}

impl PartialEq<FinishSignal> for TrainingStatus {
    fn eq(&self, other: &FinishSignal) -> bool {
        other.matches(self)
    }
}

/// How computation and gradients are distributed among ranks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParallelStrategy {
    /// Every rank holds the full model and a slice of the data
    #[default]
    DataParallel,

    /// Every layer's output units are split across ranks
    TensorModelParallel,

    /// Consecutive layers are split into per-rank stages
    PipelineModelParallel,
}

/// Whether ranks exchange updates in lock-step or reconcile in the background
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncMode {
    #[default]
    Sync,
    Async,
}

/// Strategy x sync mode selector consumed by the model layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParallelismConfig {
    pub strategy: ParallelStrategy,
    pub sync_mode: SyncMode,
}

impl ParallelismConfig {
    pub fn new(strategy: ParallelStrategy, sync_mode: SyncMode) -> Self {
        Self {
            strategy,
            sync_mode,
        }
    }

    /// Compact numeric form used when comparing the selector across ranks
    pub fn code(&self) -> u64 {
        let strategy: u64 = match self.strategy {
            ParallelStrategy::DataParallel => 0,
            ParallelStrategy::TensorModelParallel => 1,
            ParallelStrategy::PipelineModelParallel => 2,
        };
        let sync: u64 = match self.sync_mode {
            SyncMode::Sync => 0,
            SyncMode::Async => 1,
        };
        (strategy << 1) | sync
    }

    /// Inverse of [`ParallelismConfig::code`]
    pub fn from_code(code: u64) -> Option<Self> {
        let strategy = match code >> 1 {
            0 => ParallelStrategy::DataParallel,
            1 => ParallelStrategy::TensorModelParallel,
            2 => ParallelStrategy::PipelineModelParallel,
            _ => return None,
        };
        let sync_mode = if code & 1 == 0 {
            SyncMode::Sync
        } else {
            SyncMode::Async
        };
        Some(Self::new(strategy, sync_mode))
    }
}

/// What to do with the trailing rows when a split is not a multiple of the
/// batch size
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemainderPolicy {
    /// Train on full batches only, skipping the trailing rows
    #[default]
    Drop,

    /// Train on a final, shorter batch
    Partial,

    /// Refuse to train
    Error,
}
