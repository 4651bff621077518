//! Rank-aware dataset partitioning for distributed ML training
//!
//! This crate provides:
//! - **Shard discovery** of `part-<n>` files, done by the root rank only
//! - **Balanced partitioning** of shard ordinals into contiguous per-rank blocks
//! - **Collective distribution** of the plan with a fixed and a variable scatter
//! - **Shard decoding** of the whitespace/comma separated text format
//! - **Split loading** of `train_features`, `train_labels`, `test_features`, `test_labels`
//!
//! # Example
//!
//! ```rust
//! use collective::{LocalCommunicator, RankContext};
//! use data_shard::{write_shard, DatasetPartitioner, Matrix};
//!
//! let dir = tempfile::tempdir().unwrap();
//! for ordinal in 0..10 {
//!     let row = Matrix::from_rows(vec![vec![ordinal as f32, 1.0]]).unwrap();
//!     write_shard(dir.path(), ordinal, &row).unwrap();
//! }
//!
//! // Three ranks, each on its own thread
//! let per_rank = LocalCommunicator::run_group(3, |comm| {
//!     let ctx = RankContext::new(comm).unwrap();
//!     DatasetPartitioner::new(&ctx).partition_ordinals(dir.path()).unwrap()
//! })
//! .unwrap();
//!
//! assert_eq!(per_rank[0], vec![0, 1, 2, 3]);
//! assert_eq!(per_rank[1], vec![4, 5, 6]);
//! assert_eq!(per_rank[2], vec![7, 8, 9]);
//! ```

mod codec;
mod discovery;
mod loader;
mod matrix;
mod partition;
mod partitioner;

pub use codec::{decode_shard, encode_matrix, parse_matrix, write_shard};
pub use discovery::{discover_shards, parse_shard_ordinal, shard_file_name, SHARD_PREFIX};
pub use loader::{DataLoader, DatasetSplits, Split};
pub use matrix::Matrix;
pub use partition::{balanced_ranges, partition_counts, ShardAssignment};
pub use partitioner::DatasetPartitioner;

// Re-export types from runtime-core for convenience
pub use runtime_core::types::{RemainderPolicy, ShardOrdinal};
