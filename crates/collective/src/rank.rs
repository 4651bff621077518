//! Rank identity wrapping a communicator

use std::fmt;
use std::sync::Arc;

use runtime_core::{Error, Rank, Result};

use crate::communicator::{Communicator, Word};

/// The rank that owns filesystem discovery and feeds the scatters
pub const ROOT_RANK: Rank = 0;

/// Identity of this process within the group, plus the substrate it talks
/// through
///
/// Built once at bootstrap; `rank` and `size` never change afterwards.
#[derive(Clone)]
pub struct RankContext {
    rank: Rank,
    size: usize,
    comm: Arc<dyn Communicator>,
}

impl RankContext {
    /// Wrap a communicator, checking `0 <= rank < size`
    pub fn new<C: Communicator + 'static>(comm: C) -> Result<Self> {
        Self::from_shared(Arc::new(comm))
    }

    /// Wrap an already shared communicator
    pub fn from_shared(comm: Arc<dyn Communicator>) -> Result<Self> {
        let (rank, size) = (comm.rank(), comm.size());
        if size == 0 || rank >= size {
            return Err(Error::InvalidRank { rank, size });
        }
        Ok(Self { rank, size, comm })
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_root(&self) -> bool {
        self.rank == ROOT_RANK
    }

    /// The underlying substrate
    pub fn communicator(&self) -> &dyn Communicator {
        self.comm.as_ref()
    }

    pub fn broadcast(&self, values: &[Word], root: Rank) -> Result<Vec<Word>> {
        self.comm.broadcast(values, root)
    }

    pub fn scatter_fixed(
        &self,
        values: &[Word],
        chunk_size: usize,
        root: Rank,
    ) -> Result<Vec<Word>> {
        self.comm.scatter_fixed(values, chunk_size, root)
    }

    pub fn scatter_variable(
        &self,
        values: &[Word],
        counts: &[usize],
        root: Rank,
    ) -> Result<Vec<Word>> {
        self.comm.scatter_variable(values, counts, root)
    }

    pub fn barrier(&self) -> Result<()> {
        self.comm.barrier()
    }
}

impl fmt::Debug for RankContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RankContext")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}
