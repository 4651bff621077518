//! Rank-aware dataset partitioning
//!
//! Only the root rank touches the filesystem to list shards. It plans the
//! assignment and hands it out with two collectives: a fixed scatter of the
//! per-rank counts, then a variable scatter of the ordinals. Every rank issues
//! both calls for every directory, whatever root found, so the group never
//! diverges.

use std::path::{Path, PathBuf};

use collective::{RankContext, Word, ROOT_RANK};
use runtime_core::{Error, Result, ShardOrdinal};
use tracing::{info, instrument, warn};

use crate::discovery::{discover_shards, shard_file_name};
use crate::ShardAssignment;

/// Turns a directory of shard files into this rank's share of them
#[derive(Debug, Clone, Copy)]
pub struct DatasetPartitioner<'a> {
    ctx: &'a RankContext,
}

impl<'a> DatasetPartitioner<'a> {
    pub fn new(ctx: &'a RankContext) -> Self {
        Self { ctx }
    }

    /// Root-side planning; an unreadable directory yields an empty plan
    fn plan_on_root(&self, dir: &Path) -> ShardAssignment {
        let ordinals = match discover_shards(dir) {
            Ok(ordinals) => ordinals,
            Err(e) => {
                warn!(
                    path = %dir.display(),
                    error = %e,
                    "Shard discovery failed on root, distributing an empty partition"
                );
                Vec::new()
            }
        };
        ShardAssignment::plan(&ordinals, self.ctx.size())
    }

    /// Shard ordinals assigned to this rank, ascending
    #[instrument(skip(self), fields(rank = self.ctx.rank()))]
    pub fn partition_ordinals(&self, dir: &Path) -> Result<Vec<ShardOrdinal>> {
        let (counts, ordinals) = if self.ctx.is_root() {
            let assignment = self.plan_on_root(dir);
            (assignment.counts(), assignment.flattened())
        } else {
            (Vec::new(), Vec::new())
        };

        let count_words: Vec<Word> = counts.iter().map(|&count| count as Word).collect();
        let local_count = match self.ctx.scatter_fixed(&count_words, 1, ROOT_RANK)?[..] {
            [count] => count as usize,
            ref other => {
                return Err(Error::ShapeMismatch {
                    context: "scattered shard count".to_string(),
                    expected: 1,
                    actual: other.len(),
                })
            }
        };

        let local = self.ctx.scatter_variable(&ordinals, &counts, ROOT_RANK)?;
        if local.len() != local_count {
            return Err(Error::ShapeMismatch {
                context: "scattered shard ordinals".to_string(),
                expected: local_count,
                actual: local.len(),
            });
        }

        info!(
            path = %dir.display(),
            count = local_count,
            ordinals = ?local,
            "Received shard assignment"
        );
        Ok(local)
    }

    /// Paths of the shard files assigned to this rank
    pub fn partition(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        Ok(self
            .partition_ordinals(dir)?
            .into_iter()
            .map(|ordinal| dir.join(shard_file_name(ordinal)))
            .collect())
    }
}
