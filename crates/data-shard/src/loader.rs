//! Loading the four dataset splits on every rank

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use collective::RankContext;
use runtime_core::{Result, ShardOrdinal};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::codec::decode_shard;
use crate::discovery::shard_file_name;
use crate::{DatasetPartitioner, Matrix};

/// One of the subdirectories of a dataset root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Split {
    TrainFeatures,
    TrainLabels,
    TestFeatures,
    TestLabels,
}

impl Split {
    /// Load order; every rank walks the splits in this order
    pub const ALL: [Split; 4] = [
        Split::TrainFeatures,
        Split::TrainLabels,
        Split::TestFeatures,
        Split::TestLabels,
    ];

    pub fn dir_name(self) -> &'static str {
        match self {
            Split::TrainFeatures => "train_features",
            Split::TrainLabels => "train_labels",
            Split::TestFeatures => "test_features",
            Split::TestLabels => "test_labels",
        }
    }

    /// The split whose rows line up with this one
    pub fn paired(self) -> Split {
        match self {
            Split::TrainFeatures => Split::TrainLabels,
            Split::TrainLabels => Split::TrainFeatures,
            Split::TestFeatures => Split::TestLabels,
            Split::TestLabels => Split::TestFeatures,
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// This rank's rows of every split
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetSplits {
    pub train_features: Matrix,
    pub train_labels: Matrix,
    pub test_features: Matrix,
    pub test_labels: Matrix,
}

impl DatasetSplits {
    pub fn get(&self, split: Split) -> &Matrix {
        match split {
            Split::TrainFeatures => &self.train_features,
            Split::TrainLabels => &self.train_labels,
            Split::TestFeatures => &self.test_features,
            Split::TestLabels => &self.test_labels,
        }
    }

    fn set(&mut self, split: Split, matrix: Matrix) {
        match split {
            Split::TrainFeatures => self.train_features = matrix,
            Split::TrainLabels => self.train_labels = matrix,
            Split::TestFeatures => self.test_features = matrix,
            Split::TestLabels => self.test_labels = matrix,
        }
    }

    pub fn train_rows(&self) -> usize {
        self.train_features.rows()
    }

    pub fn test_rows(&self) -> usize {
        self.test_features.rows()
    }
}

/// Shards decoded for one split, `None` where the file could not be read
#[derive(Debug)]
struct DecodedSplit {
    split: Split,
    shards: Vec<(ShardOrdinal, Option<Matrix>)>,
}

impl DecodedSplit {
    fn unreadable(&self) -> HashSet<ShardOrdinal> {
        self.shards
            .iter()
            .filter(|(_, matrix)| matrix.is_none())
            .map(|(ordinal, _)| *ordinal)
            .collect()
    }

    /// Stack the readable shards, leaving out any ordinal in `dropped`
    fn assemble(self, dropped: Option<&HashSet<ShardOrdinal>>, rank: usize) -> Result<Matrix> {
        let mut parts = Vec::with_capacity(self.shards.len());
        for (ordinal, matrix) in self.shards {
            let Some(matrix) = matrix else {
                continue;
            };
            if dropped.is_some_and(|dropped| dropped.contains(&ordinal)) {
                warn!(
                    rank,
                    split = %self.split,
                    paired = %self.split.paired(),
                    ordinal,
                    "Dropping shard whose paired shard is unreadable"
                );
                continue;
            }
            parts.push(matrix);
        }
        Matrix::vstack(&parts)
    }
}

/// Loads this rank's partition of a dataset
#[derive(Debug, Clone, Copy)]
pub struct DataLoader<'a> {
    ctx: &'a RankContext,
}

impl<'a> DataLoader<'a> {
    pub fn new(ctx: &'a RankContext) -> Self {
        Self { ctx }
    }

    /// Load all four splits under `root`
    ///
    /// Every split is partitioned before any shard is decoded, so a decode
    /// failure on one rank cannot leave the others waiting in a collective.
    /// Features and labels are matched row by row: when a shard is unreadable
    /// in one split, the shard with the same ordinal in its paired split is
    /// dropped as well.
    #[instrument(skip(self), fields(rank = self.ctx.rank()))]
    pub fn load(&self, root: &Path) -> Result<DatasetSplits> {
        let partitioner = DatasetPartitioner::new(self.ctx);

        let mut assigned = Vec::with_capacity(Split::ALL.len());
        for split in Split::ALL {
            let dir = root.join(split.dir_name());
            let ordinals = partitioner.partition_ordinals(&dir)?;
            assigned.push((split, dir, ordinals));
        }

        let mut decoded = Vec::with_capacity(assigned.len());
        for (split, dir, ordinals) in &assigned {
            decoded.push(self.decode_all(*split, dir, ordinals)?);
        }

        let unreadable: HashMap<Split, HashSet<ShardOrdinal>> = decoded
            .iter()
            .map(|split| (split.split, split.unreadable()))
            .collect();

        let mut splits = DatasetSplits::default();
        for split in decoded {
            let name = split.split;
            let dropped = unreadable.get(&name.paired());
            splits.set(name, split.assemble(dropped, self.ctx.rank())?);
        }

        info!(
            train_rows = splits.train_rows(),
            test_rows = splits.test_rows(),
            "Loaded dataset partition"
        );
        Ok(splits)
    }

    /// Partition and decode a single split
    ///
    /// Issues two collectives, so every rank must call it for the same split.
    /// Unreadable shards are skipped without looking at the paired split.
    #[instrument(skip(self), fields(rank = self.ctx.rank()))]
    pub fn load_split(&self, root: &Path, split: Split) -> Result<Matrix> {
        let dir = root.join(split.dir_name());
        let ordinals = DatasetPartitioner::new(self.ctx).partition_ordinals(&dir)?;
        self.decode_all(split, &dir, &ordinals)?
            .assemble(None, self.ctx.rank())
    }

    fn decode_all(
        &self,
        split: Split,
        dir: &Path,
        ordinals: &[ShardOrdinal],
    ) -> Result<DecodedSplit> {
        let mut shards = Vec::with_capacity(ordinals.len());
        for &ordinal in ordinals {
            let path = dir.join(shard_file_name(ordinal));
            match decode_shard(&path) {
                Ok(matrix) => shards.push((ordinal, Some(matrix))),
                Err(e) if e.is_degradable() => {
                    warn!(
                        rank = self.ctx.rank(),
                        split = %split,
                        path = %path.display(),
                        error = %e,
                        "Skipping unreadable shard"
                    );
                    shards.push((ordinal, None));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(DecodedSplit { split, shards })
    }
}
