//! Collective communication for a fixed-size rank group
//!
//! This crate provides:
//! - **`Communicator`**: the blocking broadcast / scatter / barrier contract
//! - **`LocalCommunicator`**: an in-process group, one thread per rank
//! - **`RankContext`**: a rank's identity wrapping its communicator
//!
//! # Example
//!
//! ```rust
//! use collective::{LocalCommunicator, RankContext, ROOT_RANK};
//!
//! let received = LocalCommunicator::run_group(3, |comm| {
//!     let ctx = RankContext::new(comm).unwrap();
//!     let values: Vec<u64> = if ctx.is_root() { vec![10, 20, 30] } else { vec![] };
//!     ctx.scatter_fixed(&values, 1, ROOT_RANK).unwrap()
//! })
//! .unwrap();
//!
//! assert_eq!(received, vec![vec![10], vec![20], vec![30]]);
//! ```

mod communicator;
mod local;
mod rank;

pub use communicator::{check_root, Communicator, Word};
pub use local::LocalCommunicator;
pub use rank::{RankContext, ROOT_RANK};
