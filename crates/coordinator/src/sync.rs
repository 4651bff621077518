//! Background synchronization for asynchronous training
//!
//! In [`SyncMode::Async`](runtime_core::SyncMode::Async) the training loop
//! never waits on its peers. A [`FinishWatcher`] task polls the training
//! state instead, hands every status change it sees to a [`SyncStrategy`],
//! and stops once the status equals the finish signal.

use std::sync::Arc;
use std::time::Duration;

use runtime_core::{Result, ShutdownReceiver, TrainingStatus, TrainingStateHandle};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// What to do when the training loop moves on
///
/// Implementations carry the actual exchange (parameter averaging, gradient
/// pushes, ...). They are called from a runtime worker thread.
pub trait SyncStrategy: Send + Sync {
    /// Called for every status change the watcher observes
    fn on_progress(&self, status: TrainingStatus) -> Result<()>;

    /// Called once, after `on_progress`, for the final status
    fn on_finish(&self, _status: TrainingStatus) -> Result<()> {
        Ok(())
    }
}

/// Strategy that only records what it saw; useful when the model layer
/// synchronizes on its own
#[derive(Debug, Default)]
pub struct NoopSync;

impl SyncStrategy for NoopSync {
    fn on_progress(&self, status: TrainingStatus) -> Result<()> {
        debug!(%status, "Observed training progress");
        Ok(())
    }
}

/// Outcome of a watcher run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchReport {
    /// Status changes handed to the strategy
    pub observed: u64,
    /// Final status, `None` if stopped before the finish signal was reached
    pub finished: Option<TrainingStatus>,
}

/// Polls a training state until it reaches its finish signal
pub struct FinishWatcher {
    state: TrainingStateHandle,
    strategy: Arc<dyn SyncStrategy>,
    poll_interval: Duration,
}

impl FinishWatcher {
    pub fn new(
        state: TrainingStateHandle,
        strategy: Arc<dyn SyncStrategy>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            state,
            strategy,
            poll_interval,
        }
    }

    /// Run until the finish signal is observed, `stop` fires or the hosting
    /// runtime signals `shutdown`
    ///
    /// A closed channel counts as a stop request.
    pub async fn run(
        self,
        mut stop: ShutdownReceiver,
        mut shutdown: ShutdownReceiver,
    ) -> Result<WatchReport> {
        let mut report = WatchReport::default();
        let mut seen_updates = 0;

        debug!(
            poll_ms = self.poll_interval.as_millis() as u64,
            "Starting finish watcher"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {
                    let updates = self.state.updates();
                    if updates == seen_updates {
                        continue;
                    }
                    seen_updates = updates;

                    let Some(status) = self.state.status() else {
                        continue;
                    };
                    report.observed += 1;
                    self.strategy.on_progress(status)?;

                    if self.state.finish_signal().is_some_and(|finish| status == finish) {
                        self.strategy.on_finish(status)?;
                        report.finished = Some(status);
                        info!(
                            %status,
                            observed = report.observed,
                            "Finish watcher reached finish signal"
                        );
                        return Ok(report);
                    }
                }
                _ = stop.recv() => {
                    info!(
                        observed = report.observed,
                        "Finish watcher stopped before finish signal"
                    );
                    return Ok(report);
                }
                _ = shutdown.recv() => {
                    info!(
                        observed = report.observed,
                        "Runtime shutting down, finish watcher stopped"
                    );
                    return Ok(report);
                }
            }
        }
    }
}
