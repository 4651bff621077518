//! Per-rank coordination context threaded through the training components

use std::fmt;
use std::sync::Arc;

use collective::RankContext;
use runtime_core::{ParallelismConfig, TrainingState, TrainingStateHandle};

use crate::ModelTopology;

/// Everything a rank needs to coordinate with its group
///
/// Built once by [`Session::initialize`](crate::Session::initialize); the
/// parallelism value is already locked, so it never changes during a run.
#[derive(Clone)]
pub struct CoordinationContext {
    rank: RankContext,
    training: TrainingStateHandle,
    parallelism: ParallelismConfig,
    topology: ModelTopology,
    layer_sizes: Vec<usize>,
}

impl CoordinationContext {
    pub(crate) fn new(
        rank: RankContext,
        parallelism: ParallelismConfig,
        topology: ModelTopology,
        layer_sizes: Vec<usize>,
    ) -> Self {
        Self {
            rank,
            training: Arc::new(TrainingState::new()),
            parallelism,
            topology,
            layer_sizes,
        }
    }

    pub fn rank_context(&self) -> &RankContext {
        &self.rank
    }

    pub fn rank(&self) -> usize {
        self.rank.rank()
    }

    pub fn size(&self) -> usize {
        self.rank.size()
    }

    pub fn is_root(&self) -> bool {
        self.rank.is_root()
    }

    /// Shared training cursor; clone the handle to watch it from a helper
    pub fn training_state(&self) -> &TrainingStateHandle {
        &self.training
    }

    pub fn parallelism(&self) -> ParallelismConfig {
        self.parallelism
    }

    pub fn topology(&self) -> &ModelTopology {
        &self.topology
    }

    pub fn layer_sizes(&self) -> &[usize] {
        &self.layer_sizes
    }
}

impl fmt::Debug for CoordinationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoordinationContext")
            .field("rank", &self.rank.rank())
            .field("size", &self.rank.size())
            .field("parallelism", &self.parallelism)
            .field("status", &self.training.status())
            .field("layer_sizes", &self.layer_sizes)
            .finish()
    }
}
