//! Shard planning binary
//!
//! Runs a local group of ranks over a dataset and reports what each rank
//! would train on.
//!
//! Usage: `shard-plan [config.json]`

use std::path::Path;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use collective::{LocalCommunicator, RankContext};
use coordinator::{BatchPlan, Session};
use data_shard::DataLoader;
use runtime_core::{ParallelismSelector, RuntimeConfig};

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "shard_plan=info,coordinator=info,data_shard=info,collective=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_thread_names(true))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => RuntimeConfig::from_json_file(&path)?,
        None => RuntimeConfig::default(),
    };

    info!(
        world_size = config.group.world_size,
        dataset = %config.dataset.path,
        strategy = ?config.parallelism.strategy,
        "Planning shards"
    );

    let results = LocalCommunicator::run_group(config.group.world_size, |comm| {
        plan_rank(comm, &config)
    })?;

    let mut total_rows = 0;
    for result in results {
        total_rows += result?;
    }
    info!(total_train_rows = total_rows, "Shard planning complete");
    Ok(())
}

/// Load this rank's partition and log its batch plan; returns the rank's
/// training row count
fn plan_rank(comm: LocalCommunicator, config: &RuntimeConfig) -> runtime_core::Result<usize> {
    let rank = RankContext::new(comm)?;
    let selector = ParallelismSelector::new(config.parallelism);
    let session = Session::initialize(rank, &selector, &config.training.layer_sizes)?;

    // Every rank reaches finalize, even after a local failure
    let outcome = report_rank(&session, config);
    session.finalize()?;
    outcome
}

fn report_rank(session: &Session, config: &RuntimeConfig) -> runtime_core::Result<usize> {
    let splits = DataLoader::new(session.rank_context()).load(Path::new(&config.dataset.path))?;
    let plan = BatchPlan::new(
        splits.train_rows(),
        config.dataset.batch_size,
        config.dataset.remainder,
    )?;

    let layers: Vec<_> = session
        .topology()
        .layers()
        .iter()
        .map(|layer| format!("{}[{}..{}]", layer.index, layer.outputs.start, layer.outputs.end))
        .collect();

    info!(
        rank = session.rank(),
        train_rows = splits.train_rows(),
        test_rows = splits.test_rows(),
        batches = plan.batches(),
        dropped_rows = plan.dropped_rows(),
        layers = ?layers,
        "Rank plan"
    );

    Ok(splits.train_rows())
}
