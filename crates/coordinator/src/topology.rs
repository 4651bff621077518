//! Which part of the model each rank holds

use std::ops::Range;

use data_shard::balanced_ranges;
use runtime_core::{Error, ParallelStrategy, Rank, Result};
use serde::{Deserialize, Serialize};

/// The slice of one weight layer owned by a rank
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerShard {
    /// Index of the layer, 0 for the layer reading the input
    pub index: usize,
    /// Input width of the layer, never split
    pub inputs: usize,
    /// Output units held by this rank
    pub outputs: Range<usize>,
    /// Full output width of the layer
    pub full_outputs: usize,
}

impl LayerShard {
    fn whole(index: usize, inputs: usize, outputs: usize) -> Self {
        Self {
            index,
            inputs,
            outputs: 0..outputs,
            full_outputs: outputs,
        }
    }

    pub fn local_outputs(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_whole(&self) -> bool {
        self.outputs.len() == self.full_outputs
    }
}

/// Layer ownership of one rank under a parallelism strategy
///
/// `layer_sizes` lists layer widths with the input width first, so a model
/// with sizes `[4, 10, 10, 3]` has three weight layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelTopology {
    strategy: ParallelStrategy,
    rank: Rank,
    size: usize,
    layer_count: usize,
    layers: Vec<LayerShard>,
}

impl ModelTopology {
    /// Plan the layers held by `rank` in a group of `size`
    pub fn plan(
        layer_sizes: &[usize],
        strategy: ParallelStrategy,
        rank: Rank,
        size: usize,
    ) -> Result<Self> {
        validate_layer_sizes(layer_sizes)?;
        if size == 0 || rank >= size {
            return Err(Error::InvalidRank { rank, size });
        }

        let layer_count = layer_sizes.len() - 1;
        let whole_layers = layer_sizes
            .windows(2)
            .enumerate()
            .map(|(index, pair)| LayerShard::whole(index, pair[0], pair[1]));

        let layers = match strategy {
            ParallelStrategy::DataParallel => whole_layers.collect(),
            ParallelStrategy::PipelineModelParallel => {
                if layer_count < size {
                    return Err(Error::InvalidConfig {
                        message: format!(
                            "pipeline parallelism needs at least one layer per rank \
                             ({} layers, {} ranks)",
                            layer_count, size
                        ),
                    });
                }
                let stage = balanced_ranges(layer_count, size).swap_remove(rank);
                whole_layers
                    .filter(|layer| stage.contains(&layer.index))
                    .collect()
            }
            ParallelStrategy::TensorModelParallel => whole_layers
                .map(|layer| {
                    let outputs = balanced_ranges(layer.full_outputs, size).swap_remove(rank);
                    LayerShard { outputs, ..layer }
                })
                .collect(),
        };

        Ok(Self {
            strategy,
            rank,
            size,
            layer_count,
            layers,
        })
    }

    pub fn strategy(&self) -> ParallelStrategy {
        self.strategy
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// Number of weight layers in the full model
    pub fn layer_count(&self) -> usize {
        self.layer_count
    }

    /// Layers held by this rank, in model order
    pub fn layers(&self) -> &[LayerShard] {
        &self.layers
    }

    pub fn owns_layer(&self, index: usize) -> bool {
        self.layers.iter().any(|layer| layer.index == index)
    }

    /// Whether this rank reads the model input
    pub fn is_first_stage(&self) -> bool {
        self.owns_layer(0)
    }

    /// Whether this rank produces the model output
    pub fn is_last_stage(&self) -> bool {
        self.layer_count > 0 && self.owns_layer(self.layer_count - 1)
    }

    /// Rank holding the previous pipeline stage
    pub fn previous_stage(&self) -> Option<Rank> {
        match self.strategy {
            ParallelStrategy::PipelineModelParallel if self.rank > 0 => Some(self.rank - 1),
            _ => None,
        }
    }

    /// Rank holding the next pipeline stage
    pub fn next_stage(&self) -> Option<Rank> {
        match self.strategy {
            ParallelStrategy::PipelineModelParallel if self.rank + 1 < self.size => {
                Some(self.rank + 1)
            }
            _ => None,
        }
    }
}

/// Layer sizes need an input and an output width, all non-zero
pub fn validate_layer_sizes(layer_sizes: &[usize]) -> Result<()> {
    if layer_sizes.len() < 2 {
        return Err(Error::InvalidConfig {
            message: format!(
                "layer sizes need an input and an output width, got {:?}",
                layer_sizes
            ),
        });
    }
    if layer_sizes.contains(&0) {
        return Err(Error::InvalidConfig {
            message: format!("layer sizes must be non-zero, got {:?}", layer_sizes),
        });
    }
    Ok(())
}
