//! Epoch/batch training loop over a rank's dataset partition

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use data_shard::{DatasetSplits, Matrix};
use runtime_core::config::{DatasetConfig, TrainingConfig};
use runtime_core::{
    Error, FinishSignal, RemainderPolicy, Result, RuntimeConfig, RuntimeManager, ShutdownSender,
    SyncMode,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::sync::{FinishWatcher, SyncStrategy, WatchReport};
use crate::{CoordinationContext, Model};

type WatcherHandle = JoinHandle<Result<WatchReport>>;

/// How a split of `rows` rows is cut into batches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPlan {
    rows: usize,
    batch_size: usize,
    batches: usize,
    dropped_rows: usize,
}

impl BatchPlan {
    pub fn new(rows: usize, batch_size: usize, policy: RemainderPolicy) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidConfig {
                message: "batch size must be at least 1".to_string(),
            });
        }

        let full = rows / batch_size;
        let remainder = rows % batch_size;
        let (batches, dropped_rows) = match policy {
            RemainderPolicy::Drop => (full, remainder),
            RemainderPolicy::Partial => (full + usize::from(remainder > 0), 0),
            RemainderPolicy::Error if remainder > 0 => {
                return Err(Error::InvalidConfig {
                    message: format!(
                        "{} rows do not divide into batches of {} ({} left over)",
                        rows, batch_size, remainder
                    ),
                });
            }
            RemainderPolicy::Error => (full, 0),
        };

        if dropped_rows > 0 {
            warn!(
                rows,
                batch_size,
                dropped = dropped_rows,
                "Trailing rows do not fill a batch and are skipped"
            );
        }

        Ok(Self {
            rows,
            batch_size,
            batches,
            dropped_rows,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn batches(&self) -> usize {
        self.batches
    }

    /// Rows never visited by a batch
    pub fn dropped_rows(&self) -> usize {
        self.dropped_rows
    }

    /// Row range of batch `index`
    pub fn batch(&self, index: usize) -> Range<usize> {
        let start = (index * self.batch_size).min(self.rows);
        let end = (start + self.batch_size).min(self.rows);
        start..end
    }

    pub fn iter(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        (0..self.batches).map(move |index| self.batch(index))
    }
}

/// Number of classes in a label column, i.e. the largest label plus one
pub fn class_count(labels: &Matrix) -> Result<usize> {
    let mut classes = 0;
    for row in 0..labels.rows() {
        classes = classes.max(class_index(labels, row)? + 1);
    }
    Ok(classes)
}

/// Encode a label column as one row of `classes` indicators per label
pub fn one_hot(labels: &Matrix, classes: usize) -> Result<Matrix> {
    let mut encoded = Matrix::zeros(labels.rows(), classes);
    for row in 0..labels.rows() {
        let class = class_index(labels, row)?;
        if class >= classes {
            return Err(Error::InvalidLabel {
                row,
                value: class as f32,
            });
        }
        encoded.set(row, class, 1.0);
    }
    Ok(encoded)
}

fn class_index(labels: &Matrix, row: usize) -> Result<usize> {
    if labels.cols() != 1 {
        return Err(Error::ShapeMismatch {
            context: "label columns".to_string(),
            expected: 1,
            actual: labels.cols(),
        });
    }
    let value = labels.get(row, 0).unwrap_or(f32::NAN);
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 {
        return Err(Error::InvalidLabel { row, value });
    }
    Ok(value as usize)
}

/// Share of rows whose largest model output matches the label
pub fn accuracy<M: Model + ?Sized>(
    model: &mut M,
    features: &Matrix,
    labels: &Matrix,
) -> Result<f32> {
    if features.is_empty() {
        return Ok(0.0);
    }
    let output = model.forward(features)?;
    if output.rows() != labels.rows() {
        return Err(Error::ShapeMismatch {
            context: "model output rows against labels".to_string(),
            expected: labels.rows(),
            actual: output.rows(),
        });
    }

    let mut correct = 0usize;
    for row in 0..labels.rows() {
        if output.argmax_row(row) == Some(class_index(labels, row)?) {
            correct += 1;
        }
    }
    Ok(correct as f32 / labels.rows() as f32)
}

/// Metrics of one epoch on this rank
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochReport {
    pub epoch: u64,
    /// Mean batch loss
    pub loss: f32,
    pub train_accuracy: f32,
    pub test_accuracy: f32,
}

/// Drives a [`Model`] over this rank's partition
pub struct Trainer<'a> {
    context: &'a CoordinationContext,
    training: TrainingConfig,
    dataset: DatasetConfig,
    poll_interval: Duration,
    sync: Option<(&'a RuntimeManager, Arc<dyn SyncStrategy>)>,
}

impl<'a> Trainer<'a> {
    pub fn new(context: &'a CoordinationContext, config: &RuntimeConfig) -> Self {
        Self {
            context,
            training: config.training.clone(),
            dataset: config.dataset.clone(),
            poll_interval: config.sync.poll_interval,
            sync: None,
        }
    }

    /// Runtime and strategy for the background watcher used in async mode
    pub fn with_sync(
        mut self,
        runtime: &'a RuntimeManager,
        strategy: Arc<dyn SyncStrategy>,
    ) -> Self {
        self.sync = Some((runtime, strategy));
        self
    }

    /// Train for the configured number of epochs
    ///
    /// Sets the finish signal, then records the training status before every
    /// batch. In async mode a [`FinishWatcher`] runs alongside the loop and is
    /// joined before returning.
    pub fn run<M: Model + ?Sized>(
        &self,
        model: &mut M,
        data: &DatasetSplits,
    ) -> Result<Vec<EpochReport>> {
        let classes = self.check_dimensions(data)?;
        let plan = BatchPlan::new(
            data.train_rows(),
            self.dataset.batch_size,
            self.dataset.remainder,
        )?;
        if plan.batches() == 0 {
            return Err(Error::InvalidConfig {
                message: format!(
                    "rank {} has {} training rows, not enough for one batch of {}",
                    self.context.rank(),
                    plan.rows(),
                    plan.batch_size()
                ),
            });
        }

        let state = self.context.training_state();
        state.set_finish(FinishSignal::for_run(
            self.training.epochs,
            plan.batches() as u64,
        )?)?;

        info!(
            rank = self.context.rank(),
            epochs = self.training.epochs,
            batches = plan.batches(),
            classes,
            sync_mode = ?self.context.parallelism().sync_mode,
            "Starting training"
        );

        let Some((runtime, stop_tx, watcher)) = self.spawn_watcher()? else {
            return self.train(model, data, &plan, classes);
        };

        let result = self.train(model, data, &plan, classes);
        if result.is_err() {
            let _ = stop_tx.send(());
        }
        let joined = runtime.block_on(watcher).map_err(|e| Error::Internal {
            message: format!("finish watcher failed: {}", e),
        });

        // A training failure takes precedence over the watcher's outcome
        let reports = result?;
        let report = joined??;
        debug!(
            rank = self.context.rank(),
            observed = report.observed,
            finished = ?report.finished,
            "Finish watcher joined"
        );
        Ok(reports)
    }

    fn spawn_watcher(
        &self,
    ) -> Result<Option<(&'a RuntimeManager, ShutdownSender, WatcherHandle)>> {
        if self.context.parallelism().sync_mode != SyncMode::Async {
            return Ok(None);
        }
        let Some((runtime, strategy)) = &self.sync else {
            return Err(Error::InvalidConfig {
                message: "async sync mode needs a runtime and a sync strategy".to_string(),
            });
        };

        let (stop_tx, stop_rx) = broadcast::channel(1);
        let watcher = FinishWatcher::new(
            Arc::clone(self.context.training_state()),
            Arc::clone(strategy),
            self.poll_interval,
        );
        let handle = runtime.spawn(watcher.run(stop_rx, runtime.shutdown_receiver()));
        Ok(Some((*runtime, stop_tx, handle)))
    }

    /// Input width must match the model and labels must fit its output
    fn check_dimensions(&self, data: &DatasetSplits) -> Result<usize> {
        let layer_sizes = self.context.layer_sizes();
        let (inputs, outputs) = match (layer_sizes.first(), layer_sizes.last()) {
            (Some(&inputs), Some(&outputs)) => (inputs, outputs),
            _ => {
                return Err(Error::InvalidConfig {
                    message: "model has no layers".to_string(),
                })
            }
        };

        for (features, labels, split) in [
            (&data.train_features, &data.train_labels, "train"),
            (&data.test_features, &data.test_labels, "test"),
        ] {
            if features.rows() != labels.rows() {
                return Err(Error::ShapeMismatch {
                    context: format!("{} label rows", split),
                    expected: features.rows(),
                    actual: labels.rows(),
                });
            }
            if !features.is_empty() && features.cols() != inputs {
                return Err(Error::ShapeMismatch {
                    context: format!("{} feature columns", split),
                    expected: inputs,
                    actual: features.cols(),
                });
            }
        }

        let classes = class_count(&data.train_labels)?;
        if classes > outputs {
            return Err(Error::ShapeMismatch {
                context: "label classes against model outputs".to_string(),
                expected: outputs,
                actual: classes,
            });
        }
        Ok(classes)
    }

    fn train<M: Model + ?Sized>(
        &self,
        model: &mut M,
        data: &DatasetSplits,
        plan: &BatchPlan,
        classes: usize,
    ) -> Result<Vec<EpochReport>> {
        let state = self.context.training_state();
        // Encode against the model's output width so every rank agrees even
        // when its partition lacks the highest classes
        let width = self.context.layer_sizes().last().copied().unwrap_or(classes);
        let mut reports = Vec::with_capacity(self.training.epochs as usize);

        for epoch in 0..self.training.epochs {
            let mut total_loss = 0.0f32;
            for (batch, rows) in plan.iter().enumerate() {
                state.set_status(epoch, batch as u64);

                let features = data.train_features.slice_rows(rows.start, rows.len());
                let labels = one_hot(&data.train_labels.slice_rows(rows.start, rows.len()), width)?;

                model.forward(&features)?;
                total_loss += model.backward(&labels, &features)?;
            }

            let report = EpochReport {
                epoch,
                loss: total_loss / plan.batches() as f32,
                train_accuracy: accuracy(model, &data.train_features, &data.train_labels)?,
                test_accuracy: accuracy(model, &data.test_features, &data.test_labels)?,
            };
            if epoch % self.training.log_every.max(1) == 0 {
                info!(
                    rank = self.context.rank(),
                    epoch,
                    loss = report.loss,
                    train_accuracy = report.train_accuracy,
                    test_accuracy = report.test_accuracy,
                    "Epoch complete"
                );
            }
            reports.push(report);
        }

        Ok(reports)
    }
}
