//! Training coordination for a group of ranks
//!
//! This crate provides the per-rank side of a distributed training run:
//! - **Session**: initialize/finalize bracketing a run, locking the parallelism selector
//! - **Coordination context**: rank identity, training cursor and model topology in one place
//! - **Model topology**: which layers (or columns of them) each rank holds
//! - **Training loop**: batches, one-hot labels, per-epoch loss and accuracy
//! - **Background sync**: a finish watcher driving a pluggable strategy in async mode
//!
//! # Example
//!
//! ```rust
//! use collective::{LocalCommunicator, RankContext};
//! use coordinator::Session;
//! use runtime_core::ParallelismSelector;
//!
//! let strategies = LocalCommunicator::run_group(2, |comm| {
//!     let rank = RankContext::new(comm).unwrap();
//!     let selector = ParallelismSelector::default();
//!     let session = Session::initialize(rank, &selector, &[4, 10, 10, 3]).unwrap();
//!     let strategy = session.parallelism().strategy;
//!     session.finalize().unwrap();
//!     strategy
//! })
//! .unwrap();
//!
//! assert_eq!(strategies.len(), 2);
//! ```

mod context;
mod model;
mod session;
pub mod sync;
mod topology;
mod trainer;

pub use context::CoordinationContext;
pub use model::{Layer, Loss, Model, Sequential};
pub use session::Session;
pub use sync::{FinishWatcher, NoopSync, SyncStrategy, WatchReport};
pub use topology::{validate_layer_sizes, LayerShard, ModelTopology};
pub use trainer::{accuracy, class_count, one_hot, BatchPlan, EpochReport, Trainer};
