//! End-to-end training simulation test
//!
//! This test simulates a realistic distributed training run with:
//! - A sharded dataset written to disk
//! - A group of ranks initializing a session and loading their partitions
//! - A small softmax classifier trained on every rank
//! - Background synchronization in async mode, stopping at the finish signal

use anyhow::Result;
use collective::{LocalCommunicator, RankContext};
use coordinator::{EpochReport, Layer, Loss, Sequential, Session, SyncStrategy, Trainer};
use data_shard::{write_shard, DataLoader, Matrix, Split};
use parking_lot::Mutex;
use runtime_core::{
    FinishSignal, ParallelStrategy, ParallelismConfig, ParallelismSelector, RuntimeConfig,
    RuntimeManagerBuilder, SyncMode, TrainingStatus,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const FEATURES: usize = 4;
const CLASSES: usize = 3;
const ROWS_PER_SHARD: usize = 8;

/// Fully connected layer updated with plain gradient descent
struct Linear {
    inputs: usize,
    outputs: usize,
    weights: Vec<f32>,
    bias: Vec<f32>,
    learning_rate: f32,
    last_input: Option<Matrix>,
}

impl Linear {
    fn new(inputs: usize, outputs: usize, learning_rate: f32) -> Self {
        Self {
            inputs,
            outputs,
            weights: vec![0.0; inputs * outputs],
            bias: vec![0.0; outputs],
            learning_rate,
            last_input: None,
        }
    }
}

impl Layer for Linear {
    fn name(&self) -> &str {
        "linear"
    }

    fn forward(&mut self, input: &Matrix) -> runtime_core::Result<Matrix> {
        let mut output = Matrix::zeros(input.rows(), self.outputs);
        for (row, values) in input.iter_rows().enumerate() {
            for out in 0..self.outputs {
                let mut sum = self.bias[out];
                for (i, value) in values.iter().enumerate() {
                    sum += value * self.weights[i * self.outputs + out];
                }
                output.set(row, out, sum);
            }
        }
        self.last_input = Some(input.clone());
        Ok(output)
    }

    fn backward(&mut self, grad_output: &Matrix) -> runtime_core::Result<Matrix> {
        let input = self.last_input.take().ok_or_else(|| runtime_core::Error::Model {
            message: "backward before forward".to_string(),
        })?;
        let rows = input.rows().max(1) as f32;

        let mut grad_input = Matrix::zeros(input.rows(), self.inputs);
        for row in 0..input.rows() {
            for i in 0..self.inputs {
                let mut sum = 0.0;
                for out in 0..self.outputs {
                    sum += grad_output.row(row)[out] * self.weights[i * self.outputs + out];
                }
                grad_input.set(row, i, sum);
            }
        }

        for row in 0..input.rows() {
            let grad = grad_output.row(row);
            for out in 0..self.outputs {
                self.bias[out] -= self.learning_rate * grad[out] / rows;
                for i in 0..self.inputs {
                    self.weights[i * self.outputs + out] -=
                        self.learning_rate * input.row(row)[i] * grad[out] / rows;
                }
            }
        }
        Ok(grad_input)
    }
}

/// Mean cross-entropy of a row-wise softmax
struct SoftmaxCrossEntropy;

fn softmax(predictions: &Matrix) -> Matrix {
    let mut probabilities = Matrix::zeros(predictions.rows(), predictions.cols());
    for (row, values) in predictions.iter_rows().enumerate() {
        let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f32> = values.iter().map(|v| (v - max).exp()).collect();
        let total: f32 = exps.iter().sum();
        for (col, e) in exps.iter().enumerate() {
            probabilities.set(row, col, e / total);
        }
    }
    probabilities
}

impl Loss for SoftmaxCrossEntropy {
    fn loss(&self, predictions: &Matrix, labels: &Matrix) -> runtime_core::Result<f32> {
        let probabilities = softmax(predictions);
        let total: f32 = probabilities
            .data()
            .iter()
            .zip(labels.data())
            .map(|(p, y)| -y * p.max(1e-7).ln())
            .sum();
        Ok(total / predictions.rows().max(1) as f32)
    }

    fn gradient(&self, predictions: &Matrix, labels: &Matrix) -> runtime_core::Result<Matrix> {
        let probabilities = softmax(predictions);
        let data = probabilities
            .data()
            .iter()
            .zip(labels.data())
            .map(|(p, y)| p - y)
            .collect();
        Matrix::new(predictions.rows(), predictions.cols(), data)
    }
}

fn classifier() -> Sequential {
    Sequential::new(Box::new(SoftmaxCrossEntropy))
        .with_layer(Box::new(Linear::new(FEATURES, CLASSES, 0.1)))
}

/// Separable three-class data: class `k` has a large value in feature `k`
fn write_dataset(root: &Path, train_shards: u64, test_shards: u64) -> Result<()> {
    for split in Split::ALL {
        let shards = match split {
            Split::TrainFeatures | Split::TrainLabels => train_shards,
            Split::TestFeatures | Split::TestLabels => test_shards,
        };
        for ordinal in 0..shards {
            let mut rows = Vec::with_capacity(ROWS_PER_SHARD);
            for r in 0..ROWS_PER_SHARD {
                let class = (ordinal as usize + r) % CLASSES;
                let row = match split {
                    Split::TrainFeatures | Split::TestFeatures => (0..FEATURES)
                        .map(|f| {
                            let jitter = ((r * 7 + f * 3) % 5) as f32 * 0.05;
                            if f == class { 5.0 + jitter } else { jitter }
                        })
                        .collect(),
                    Split::TrainLabels | Split::TestLabels => vec![class as f32],
                };
                rows.push(row);
            }
            write_shard(&root.join(split.dir_name()), ordinal, &Matrix::from_rows(rows)?)?;
        }
    }
    Ok(())
}

fn training_config(epochs: u64) -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.training.epochs = epochs;
    config.training.layer_sizes = vec![FEATURES, CLASSES];
    config.dataset.batch_size = ROWS_PER_SHARD;
    config.sync.poll_interval = Duration::from_millis(1);
    config
}

type RankOutcome = (Vec<EpochReport>, Option<TrainingStatus>);

#[test]
fn test_sync_training_across_ranks() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    write_dataset(temp_dir.path(), 9, 3)?;
    let config = training_config(20);

    let results = LocalCommunicator::run_group(3, |comm| -> Result<RankOutcome> {
        let rank = RankContext::new(comm)?;
        let selector = ParallelismSelector::new(config.parallelism);
        let session = Session::initialize(rank, &selector, &config.training.layer_sizes)?;

        let outcome = DataLoader::new(session.rank_context())
            .load(temp_dir.path())
            .and_then(|data| {
                Trainer::new(session.context(), &config).run(&mut classifier(), &data)
            });
        let status = session.training_state().status();
        session.finalize()?;
        Ok((outcome?, status))
    })?;

    for result in results {
        let (reports, status) = result?;
        assert_eq!(reports.len(), 20);

        // 3 shards of 8 rows per rank, batches of 8
        assert_eq!(status, Some(TrainingStatus::new(19, 2)));

        let first = reports.first().map(|r| r.loss).unwrap_or_default();
        let last = reports.last().copied().expect("at least one epoch");
        assert!(last.loss < first, "loss should fall: {} -> {}", first, last.loss);
        assert!(last.train_accuracy >= 0.9, "train accuracy {}", last.train_accuracy);
    }
    Ok(())
}

/// Records what the finish watcher reports
#[derive(Default)]
struct RecordingSync {
    progress: Mutex<Vec<TrainingStatus>>,
    finished: Mutex<Vec<TrainingStatus>>,
}

impl SyncStrategy for RecordingSync {
    fn on_progress(&self, status: TrainingStatus) -> runtime_core::Result<()> {
        self.progress.lock().push(status);
        Ok(())
    }

    fn on_finish(&self, status: TrainingStatus) -> runtime_core::Result<()> {
        self.finished.lock().push(status);
        Ok(())
    }
}

type WatchOutcome = (Vec<TrainingStatus>, usize, FinishSignal);

#[test]
fn test_async_training_stops_at_finish_signal() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    write_dataset(temp_dir.path(), 4, 2)?;
    let mut config = training_config(5);
    config.parallelism = ParallelismConfig::new(ParallelStrategy::DataParallel, SyncMode::Async);
    let runtime = RuntimeManagerBuilder::new()
        .config(config.clone())
        .runtime_threads(2)
        .build()?;

    let results = LocalCommunicator::run_group(2, |comm| -> Result<WatchOutcome> {
        let rank = RankContext::new(comm)?;
        let selector = ParallelismSelector::new(config.parallelism);
        let session = Session::initialize(rank, &selector, &config.training.layer_sizes)?;
        let strategy = Arc::new(RecordingSync::default());

        let outcome = DataLoader::new(session.rank_context())
            .load(temp_dir.path())
            .and_then(|data| {
                Trainer::new(session.context(), &config)
                    .with_sync(&runtime, strategy.clone())
                    .run(&mut classifier(), &data)
            });
        let finish = session.training_state().finish_signal();
        session.finalize()?;
        outcome?;

        let finished = strategy.finished.lock().clone();
        let observed = strategy.progress.lock().len();
        Ok((finished, observed, finish.expect("finish signal set by the trainer")))
    })?;

    for result in results {
        let (finished, observed, finish) = result?;
        // 2 shards of 8 rows per rank, batches of 8
        assert_eq!(finish, FinishSignal { epoch: 4, batch: 1 });
        assert_eq!(finished, vec![TrainingStatus::new(4, 1)]);
        assert!(observed >= 1);
    }
    Ok(())
}

#[test]
fn test_pipeline_topology_per_rank() -> Result<()> {
    let selector_config =
        ParallelismConfig::new(ParallelStrategy::PipelineModelParallel, SyncMode::Sync);

    let stages = LocalCommunicator::run_group(3, |comm| -> Result<Vec<usize>> {
        let rank = RankContext::new(comm)?;
        let selector = ParallelismSelector::new(selector_config);
        let session = Session::initialize(rank, &selector, &[4, 16, 16, 8, 3])?;
        let layers = session.topology().layers().iter().map(|l| l.index).collect();
        session.finalize()?;
        Ok(layers)
    })?;

    let stages: Vec<_> = stages.into_iter().collect::<Result<_>>()?;
    assert_eq!(stages, vec![vec![0, 1], vec![2], vec![3]]);
    Ok(())
}
