//! Collective communication trait definition
//!
//! Defines the blocking group interface every substrate must implement.

use runtime_core::{Error, Result};

/// Element type carried by the collectives
///
/// Counts and shard ordinals both fit; richer payloads are the model layer's
/// business.
pub type Word = u64;

/// Blocking collective operations over a fixed-size rank group
///
/// Every rank must issue the same collectives, in the same order, with the
/// same `root` and size parameters. A rank that skips or reorders a call
/// leaves the rest of the group waiting forever; there is no timeout.
pub trait Communicator: Send + Sync {
    /// 0-based identity of this rank, stable for the process lifetime
    fn rank(&self) -> usize;

    /// Number of ranks in the group, at least 1
    fn size(&self) -> usize;

    /// Copy root's `values` to every rank
    ///
    /// `values` is only read on `root`.
    fn broadcast(&self, values: &[Word], root: usize) -> Result<Vec<Word>>;

    /// Give every rank exactly `chunk_size` consecutive elements of root's
    /// `values`, rank `r` receiving chunk `r`
    ///
    /// On `root`, `values.len()` must equal `chunk_size * size()`; otherwise
    /// every rank returns [`Error::ScatterCountMismatch`].
    fn scatter_fixed(&self, values: &[Word], chunk_size: usize, root: usize) -> Result<Vec<Word>>;

    /// Give rank `r` the next `counts[r]` elements of root's `values`
    ///
    /// `values` and `counts` are only read on `root`, where `counts` must
    /// have one entry per rank and sum to `values.len()`; otherwise every
    /// rank returns an error.
    fn scatter_variable(
        &self,
        values: &[Word],
        counts: &[usize],
        root: usize,
    ) -> Result<Vec<Word>>;

    /// Wait until every rank has entered the barrier
    fn barrier(&self) -> Result<()>;
}

/// Reject a root outside the group
///
/// Every rank evaluates this identically before entering a collective, so a
/// bad root fails the whole group at once instead of stranding it.
pub fn check_root(root: usize, size: usize) -> Result<()> {
    if root >= size {
        return Err(Error::InvalidRoot { root, size });
    }
    Ok(())
}

/// Split root's buffer for a fixed-size scatter
pub(crate) fn split_fixed(
    values: &[Word],
    chunk_size: usize,
    size: usize,
) -> Result<Vec<Vec<Word>>> {
    let expected = chunk_size * size;
    if values.len() != expected {
        return Err(Error::ScatterCountMismatch {
            expected,
            actual: values.len(),
        });
    }

    if chunk_size == 0 {
        return Ok(vec![Vec::new(); size]);
    }
    Ok(values.chunks(chunk_size).map(<[Word]>::to_vec).collect())
}

/// Split root's buffer for a variable-size scatter
pub(crate) fn split_variable(
    values: &[Word],
    counts: &[usize],
    size: usize,
) -> Result<Vec<Vec<Word>>> {
    if counts.len() != size {
        return Err(Error::Communication {
            message: format!(
                "scatter counts cover {} ranks, group has {}",
                counts.len(),
                size
            ),
        });
    }

    let expected: usize = counts.iter().sum();
    if expected != values.len() {
        return Err(Error::ScatterCountMismatch {
            expected,
            actual: values.len(),
        });
    }

    let mut parts = Vec::with_capacity(size);
    let mut offset = 0;
    for &count in counts {
        parts.push(values[offset..offset + count].to_vec());
        offset += count;
    }
    Ok(parts)
}
