//! Runtime Core - Foundation for rank-aware distributed training
//!
//! Provides core types, error handling, configuration, the per-rank training
//! cursor, the write-once parallelism selector and the async runtime that
//! hosts background synchronization helpers.

pub mod config;
pub mod error;
pub mod parallelism;
pub mod runtime;
pub mod state;
pub mod types;

pub use config::RuntimeConfig;
pub use error::{Error, Result};
pub use parallelism::{ParallelismHandle, ParallelismSelector};
pub use runtime::{RuntimeManager, RuntimeManagerBuilder, ShutdownReceiver, ShutdownSender};
pub use state::{TrainingState, TrainingStateHandle};
pub use types::*;
