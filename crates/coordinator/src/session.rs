//! Bootstrap and teardown bracketing a training run

use std::ops::Deref;

use collective::{RankContext, Word, ROOT_RANK};
use runtime_core::{Error, ParallelismConfig, ParallelismSelector, Result};
use tracing::{info, warn};

use crate::topology::validate_layer_sizes;
use crate::{CoordinationContext, ModelTopology};

/// A rank's membership in a training run
///
/// Created by [`Session::initialize`] and ended by [`Session::finalize`].
/// Every rank must initialize and finalize the same number of times, since
/// both steps are collective.
#[derive(Debug)]
pub struct Session {
    context: CoordinationContext,
    finalized: bool,
}

impl Session {
    /// Start a run on this rank
    ///
    /// Locks the parallelism selector and compares it with the root's, then
    /// validates the layer sizes and plans this rank's share of the model.
    /// A selector that differs from the root's is reported but not corrected.
    /// The comparison is a collective, so every rank takes part in it before
    /// any local check can fail.
    pub fn initialize(
        rank: RankContext,
        selector: &ParallelismSelector,
        layer_sizes: &[usize],
    ) -> Result<Self> {
        let parallelism = selector.lock();

        let local_code: Word = parallelism.code();
        let root_code = match rank.broadcast(&[local_code], ROOT_RANK)?[..] {
            [code] => code,
            ref other => {
                return Err(Error::ShapeMismatch {
                    context: "broadcast parallelism code".to_string(),
                    expected: 1,
                    actual: other.len(),
                })
            }
        };
        if root_code != local_code {
            warn!(
                rank = rank.rank(),
                local = ?parallelism,
                root = ?ParallelismConfig::from_code(root_code),
                "Parallelism configuration differs from the root rank"
            );
        }

        validate_layer_sizes(layer_sizes)?;
        let topology =
            ModelTopology::plan(layer_sizes, parallelism.strategy, rank.rank(), rank.size())?;

        info!(
            rank = rank.rank(),
            size = rank.size(),
            strategy = ?parallelism.strategy,
            sync_mode = ?parallelism.sync_mode,
            layers = topology.layers().len(),
            "Session initialized"
        );

        Ok(Self {
            context: CoordinationContext::new(rank, parallelism, topology, layer_sizes.to_vec()),
            finalized: false,
        })
    }

    pub fn context(&self) -> &CoordinationContext {
        &self.context
    }

    /// End the run once every rank has reached this point
    pub fn finalize(mut self) -> Result<()> {
        // Mark first so a failed barrier does not also warn on drop
        self.finalized = true;
        self.context.rank_context().barrier()?;
        info!(rank = self.context.rank(), "Session finalized");
        Ok(())
    }
}

impl Deref for Session {
    type Target = CoordinationContext;

    fn deref(&self) -> &Self::Target {
        &self.context
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.finalized {
            warn!(
                rank = self.context.rank(),
                "Session dropped without finalize, releasing locally"
            );
        }
    }
}
