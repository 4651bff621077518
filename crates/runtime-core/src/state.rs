//! Training progress cursor shared between the training loop and its helpers

use crate::{Error, FinishSignal, Result, TrainingStatus};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Training cursor of one rank
///
/// The training loop is the only writer of the status; background helpers
/// read it to decide when to stop. The finish signal is written once, before
/// the loop starts.
#[derive(Debug, Default)]
pub struct TrainingState {
    /// Current (epoch, batch), unset until the first batch starts
    status: RwLock<Option<TrainingStatus>>,

    /// Terminal position
    finish: OnceLock<FinishSignal>,

    /// Number of status updates, lets readers notice progress cheaply
    updates: AtomicU64,
}

impl TrainingState {
    /// Create an empty training state
    pub fn new() -> Self {
        Self::default()
    }

    /// Fix the terminal position; fails if it was already fixed
    pub fn set_finish(&self, signal: FinishSignal) -> Result<()> {
        self.finish
            .set(signal)
            .map_err(|_| Error::FinishSignalAlreadySet)?;
        debug!(epoch = signal.epoch, batch = signal.batch, "Finish signal set");
        Ok(())
    }

    /// The terminal position, if fixed
    pub fn finish_signal(&self) -> Option<FinishSignal> {
        self.finish.get().copied()
    }

    /// Record the batch the training loop is about to process
    pub fn set_status(&self, epoch: u64, batch: u64) {
        *self.status.write() = Some(TrainingStatus::new(epoch, batch));
        self.updates.fetch_add(1, Ordering::Release);
    }

    /// Current position, `None` before the first batch
    pub fn status(&self) -> Option<TrainingStatus> {
        *self.status.read()
    }

    /// Number of `set_status` calls so far
    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Acquire)
    }

    /// Returns true once the status equals the finish signal
    pub fn is_finished(&self) -> bool {
        match (self.status(), self.finish_signal()) {
            (Some(status), Some(finish)) => status == finish,
            _ => false,
        }
    }
}

/// Thread-safe handle to a training state
pub type TrainingStateHandle = Arc<TrainingState>;
