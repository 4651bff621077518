//! Write-once parallelism selector

use crate::{Error, ParallelStrategy, ParallelismConfig, Result, SyncMode};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

/// Parallelism selector that is mutable until locked
///
/// Bootstrap locks it; from then on the model layer only ever sees one value.
#[derive(Debug, Default)]
pub struct ParallelismSelector {
    /// Current value and whether it has been locked
    inner: RwLock<(ParallelismConfig, bool)>,
}

impl ParallelismSelector {
    /// Create an unlocked selector
    pub fn new(config: ParallelismConfig) -> Self {
        Self {
            inner: RwLock::new((config, false)),
        }
    }

    /// Replace the whole selector value
    pub fn set(&self, config: ParallelismConfig) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.1 {
            return Err(Error::ParallelismLocked);
        }
        inner.0 = config;
        Ok(())
    }

    pub fn set_strategy(&self, strategy: ParallelStrategy) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.1 {
            return Err(Error::ParallelismLocked);
        }
        inner.0.strategy = strategy;
        Ok(())
    }

    pub fn set_sync_mode(&self, sync_mode: SyncMode) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.1 {
            return Err(Error::ParallelismLocked);
        }
        inner.0.sync_mode = sync_mode;
        Ok(())
    }

    /// Lock the selector and return the final value
    ///
    /// Locking twice is allowed and returns the same value.
    pub fn lock(&self) -> ParallelismConfig {
        let mut inner = self.inner.write();
        if !inner.1 {
            inner.1 = true;
            info!(
                strategy = ?inner.0.strategy,
                sync_mode = ?inner.0.sync_mode,
                "Parallelism configuration locked"
            );
        }
        inner.0
    }

    pub fn is_locked(&self) -> bool {
        self.inner.read().1
    }

    /// Current value
    pub fn get(&self) -> ParallelismConfig {
        self.inner.read().0
    }
}

/// Thread-safe handle to a parallelism selector
pub type ParallelismHandle = Arc<ParallelismSelector>;
