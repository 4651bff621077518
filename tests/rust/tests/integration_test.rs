//! Multi-rank partitioning tests
//!
//! Every test runs a real group of rank threads over the in-process
//! communicator, so a divergence between ranks shows up as a hang or an error
//! rather than being mocked away.

use anyhow::Result;
use collective::{Communicator, LocalCommunicator, RankContext, ROOT_RANK};
use data_shard::{shard_file_name, DataLoader, DatasetPartitioner, Matrix, ShardOrdinal, Split};
use runtime_core::Error;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn write_empty_shards(dir: &Path, ordinals: impl IntoIterator<Item = ShardOrdinal>) -> Result<()> {
    fs::create_dir_all(dir)?;
    for ordinal in ordinals {
        fs::write(dir.join(shard_file_name(ordinal)), "0\n")?;
    }
    Ok(())
}

fn partition(dir: &Path, ranks: usize) -> Result<Vec<Vec<ShardOrdinal>>> {
    let per_rank = LocalCommunicator::run_group(ranks, |comm| -> Result<Vec<ShardOrdinal>> {
        let ctx = RankContext::new(comm)?;
        Ok(DatasetPartitioner::new(&ctx).partition_ordinals(dir)?)
    })?;
    per_rank.into_iter().collect()
}

#[test]
fn test_ten_files_three_ranks() -> Result<()> {
    init_tracing();
    let temp_dir = tempfile::tempdir()?;
    write_empty_shards(temp_dir.path(), 0..10)?;

    let per_rank = partition(temp_dir.path(), 3)?;

    let counts: Vec<_> = per_rank.iter().map(Vec::len).collect();
    assert_eq!(counts, vec![4, 3, 3]);
    assert_eq!(per_rank[0], vec![0, 1, 2, 3]);
    Ok(())
}

#[test]
fn test_zero_files() -> Result<()> {
    init_tracing();
    let temp_dir = tempfile::tempdir()?;

    let per_rank = partition(temp_dir.path(), 3)?;

    assert_eq!(per_rank, vec![Vec::<ShardOrdinal>::new(); 3]);
    Ok(())
}

#[test]
fn test_unreadable_directory_on_root_four_ranks() -> Result<()> {
    init_tracing();
    let temp_dir = tempfile::tempdir()?;
    // A regular file where a directory is expected cannot be listed
    let not_a_dir = temp_dir.path().join("train_features");
    fs::write(&not_a_dir, "not a directory")?;

    let per_rank = partition(&not_a_dir, 4)?;

    assert_eq!(per_rank.len(), 4);
    assert!(per_rank.iter().all(Vec::is_empty));
    Ok(())
}

#[test]
fn test_partition_covers_every_file_once() -> Result<()> {
    init_tracing();
    for file_count in [0u64, 1, 2, 7, 10, 33] {
        for ranks in [1usize, 2, 3, 4, 8] {
            let temp_dir = tempfile::tempdir()?;
            write_empty_shards(temp_dir.path(), 0..file_count)?;

            let per_rank = partition(temp_dir.path(), ranks)?;

            let counts: Vec<_> = per_rank.iter().map(Vec::len).collect();
            let max = counts.iter().copied().max().unwrap_or(0);
            let min = counts.iter().copied().min().unwrap_or(0);
            assert!(max - min <= 1, "files={} ranks={} counts={:?}", file_count, ranks, counts);

            let all: Vec<_> = per_rank.into_iter().flatten().collect();
            let unique: HashSet<_> = all.iter().copied().collect();
            assert_eq!(all.len(), unique.len(), "duplicate shard assignment");
            assert_eq!(unique, (0..file_count).collect::<HashSet<_>>());
        }
    }
    Ok(())
}

#[test]
fn test_numbering_gaps_and_strays() -> Result<()> {
    init_tracing();
    let temp_dir = tempfile::tempdir()?;
    write_empty_shards(temp_dir.path(), [0, 2, 11, 3, 40])?;
    fs::write(temp_dir.path().join("_SUCCESS"), "")?;
    fs::write(temp_dir.path().join(".part-5.crc"), "")?;

    let per_rank = partition(temp_dir.path(), 2)?;

    assert_eq!(per_rank, vec![vec![0, 2, 3], vec![11, 40]]);
    Ok(())
}

#[test]
fn test_scatter_lengths_match_declared_counts() -> Result<()> {
    init_tracing();
    let counts = [3usize, 0, 5, 1];
    let values: Vec<u64> = (0..counts.iter().sum::<usize>() as u64).collect();

    let received = LocalCommunicator::run_group(counts.len(), |comm| -> Result<_> {
        let fixed = comm.scatter_fixed(&values[..8], 2, ROOT_RANK)?;
        let variable = comm.scatter_variable(&values, &counts, ROOT_RANK)?;
        Ok((fixed, variable))
    })?;

    let mut total = 0;
    for (rank, result) in received.into_iter().enumerate() {
        let (fixed, variable) = result?;
        assert_eq!(fixed.len(), 2);
        assert_eq!(variable.len(), counts[rank]);
        total += variable.len();
    }
    assert_eq!(total, values.len());
    Ok(())
}

#[test]
fn test_bad_scatter_counts_fail_on_every_rank() -> Result<()> {
    init_tracing();
    let results = LocalCommunicator::run_group(3, |comm| {
        // Counts sum to 4 but root sends 5 values
        comm.scatter_variable(&[1, 2, 3, 4, 5], &[1, 1, 2], ROOT_RANK)
    })?;

    for result in results {
        assert!(matches!(result, Err(Error::ScatterCountMismatch { .. })));
    }
    Ok(())
}

#[test]
fn test_load_splits_across_ranks() -> Result<()> {
    init_tracing();
    let temp_dir = tempfile::tempdir()?;
    for split in Split::ALL {
        for ordinal in 0..6u64 {
            let rows = (0..3).map(|r| vec![ordinal as f32, r as f32]).collect();
            data_shard::write_shard(
                &temp_dir.path().join(split.dir_name()),
                ordinal,
                &Matrix::from_rows(rows)?,
            )?;
        }
    }

    let loaded = LocalCommunicator::run_group(4, |comm| -> Result<_> {
        let ctx = RankContext::new(comm)?;
        Ok(DataLoader::new(&ctx).load(temp_dir.path())?)
    })?;

    let mut total_rows = 0;
    for (rank, splits) in loaded.into_iter().enumerate() {
        let splits = splits?;
        // 6 shards over 4 ranks -> 2, 2, 1, 1 shards of 3 rows
        let expected = if rank < 2 { 6 } else { 3 };
        for split in Split::ALL {
            assert_eq!(splits.get(split).rows(), expected, "rank {} {}", rank, split);
        }
        total_rows += splits.train_rows();
    }
    assert_eq!(total_rows, 18);
    Ok(())
}
