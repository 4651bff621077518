//! Balanced, contiguous partitioning of shard ordinals across ranks

use std::ops::Range;

use runtime_core::ShardOrdinal;
use serde::{Deserialize, Serialize};

/// Number of items each of `parts` ranks receives
///
/// The remainder goes to the lowest ranks, one extra item each, so counts
/// differ by at most one.
pub fn partition_counts(total: usize, parts: usize) -> Vec<usize> {
    if parts == 0 {
        return Vec::new();
    }

    let base = total / parts;
    let remainder = total % parts;
    (0..parts)
        .map(|i| if i < remainder { base + 1 } else { base })
        .collect()
}

/// Contiguous index ranges matching [`partition_counts`]
pub fn balanced_ranges(total: usize, parts: usize) -> Vec<Range<usize>> {
    let mut start = 0;
    partition_counts(total, parts)
        .into_iter()
        .map(|count| {
            let range = start..start + count;
            start += count;
            range
        })
        .collect()
}

/// Shard ordinals assigned to each rank, in rank order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardAssignment {
    per_rank: Vec<Vec<ShardOrdinal>>,
}

impl ShardAssignment {
    /// Split `ordinals` into contiguous balanced blocks, one per rank
    pub fn plan(ordinals: &[ShardOrdinal], world_size: usize) -> Self {
        let per_rank = balanced_ranges(ordinals.len(), world_size)
            .into_iter()
            .map(|range| ordinals[range].to_vec())
            .collect();
        Self { per_rank }
    }

    /// Assemble an assignment from per-rank lists, e.g. gathered results
    pub fn from_parts(per_rank: Vec<Vec<ShardOrdinal>>) -> Self {
        Self { per_rank }
    }

    pub fn world_size(&self) -> usize {
        self.per_rank.len()
    }

    /// Shards of one rank, empty for ranks outside the assignment
    pub fn for_rank(&self, rank: usize) -> &[ShardOrdinal] {
        self.per_rank.get(rank).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn counts(&self) -> Vec<usize> {
        self.per_rank.iter().map(Vec::len).collect()
    }

    /// Every rank's ordinals concatenated in rank order
    pub fn flattened(&self) -> Vec<ShardOrdinal> {
        self.per_rank.iter().flatten().copied().collect()
    }

    pub fn total(&self) -> usize {
        self.per_rank.iter().map(Vec::len).sum()
    }

    /// Difference between the largest and smallest per-rank count
    pub fn imbalance(&self) -> usize {
        let counts = self.counts();
        match (counts.iter().max(), counts.iter().min()) {
            (Some(max), Some(min)) => max - min,
            _ => 0,
        }
    }
}
