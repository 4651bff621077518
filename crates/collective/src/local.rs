//! In-process collective group
//!
//! Every rank is a thread holding a [`LocalCommunicator`]; the group shares
//! one rendezvous guarded by a mutex and a condition variable. A collective
//! is two rendezvous rounds: after the first, root's data is published and
//! every rank has entered; after the second, every rank has taken its part.

use std::sync::Arc;
use std::thread;

use parking_lot::{Condvar, Mutex, MutexGuard};
use runtime_core::{Error, Result};
use tracing::{trace, warn};

use crate::communicator::{check_root, split_fixed, split_variable, Communicator, Word};

/// Rendezvous state shared by all ranks of a group
#[derive(Debug, Default)]
struct GroupState {
    /// Ranks waiting in the current round
    arrived: usize,

    /// Bumped every time a round completes
    generation: u64,

    /// Set when a rank died; wakes and fails every waiter
    poisoned: bool,

    /// Root's per-rank payload for the current collective
    parts: Vec<Option<Vec<Word>>>,

    /// Root's validation failure for the current collective; every rank
    /// receives a copy of the same variant
    failure: Option<Error>,
}

#[derive(Debug)]
struct GroupShared {
    size: usize,
    state: Mutex<GroupState>,
    released: Condvar,
}

impl GroupShared {
    /// Block until every rank has arrived in the current round
    fn arrive(&self, state: &mut MutexGuard<'_, GroupState>) -> Result<()> {
        if state.poisoned {
            return Err(Error::GroupPoisoned);
        }

        let generation = state.generation;
        state.arrived += 1;

        if state.arrived == self.size {
            state.arrived = 0;
            state.generation = state.generation.wrapping_add(1);
            self.released.notify_all();
            return Ok(());
        }

        while state.generation == generation && !state.poisoned {
            self.released.wait(state);
        }

        if state.generation == generation {
            return Err(Error::GroupPoisoned);
        }
        Ok(())
    }

    fn poison(&self) {
        let mut state = self.state.lock();
        state.poisoned = true;
        self.released.notify_all();
    }
}

/// One rank's handle on an in-process collective group
#[derive(Debug)]
pub struct LocalCommunicator {
    rank: usize,
    shared: Arc<GroupShared>,
}

impl LocalCommunicator {
    /// Create the communicators of a group of `size` ranks, in rank order
    pub fn new_group(size: usize) -> Vec<Self> {
        let shared = Arc::new(GroupShared {
            size,
            state: Mutex::new(GroupState::default()),
            released: Condvar::new(),
        });

        (0..size)
            .map(|rank| Self {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect()
    }

    /// Run `f` once per rank, each on its own thread, and collect the
    /// results in rank order
    ///
    /// A panicking rank poisons the group so the other ranks fail instead of
    /// waiting forever; the panic is then propagated to the caller.
    pub fn run_group<T, F>(size: usize, f: F) -> Result<Vec<T>>
    where
        F: Fn(LocalCommunicator) -> T + Sync,
        T: Send,
    {
        let group = Self::new_group(size);
        let Some(shared) = group.first().map(|comm| Arc::clone(&comm.shared)) else {
            return Ok(Vec::new());
        };
        let f = &f;

        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(size);
            for comm in group {
                let spawned = thread::Builder::new()
                    .name(format!("rank-{}", comm.rank))
                    .spawn_scoped(scope, move || f(comm));

                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        // Ranks already running would wait for the missing one
                        shared.poison();
                        return Err(Error::Io(e));
                    }
                }
            }

            let mut results = Vec::with_capacity(size);
            for handle in handles {
                match handle.join() {
                    Ok(result) => results.push(result),
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }
            Ok(results)
        })
    }

    /// Root-based exchange shared by broadcast and both scatters
    fn exchange<P>(&self, op: &'static str, root: usize, publish: P) -> Result<Vec<Word>>
    where
        P: FnOnce() -> Result<Vec<Vec<Word>>>,
    {
        check_root(root, self.shared.size)?;
        trace!(rank = self.rank, op, root, "Entering collective");

        let mut state = self.shared.state.lock();
        if self.rank == root {
            match publish() {
                Ok(parts) => {
                    state.parts = parts.into_iter().map(Some).collect();
                    state.failure = None;
                }
                Err(e) => {
                    state.parts.clear();
                    state.failure = Some(e);
                }
            }
        }

        self.shared.arrive(&mut state)?;

        let received = match &state.failure {
            Some(failure) => Err(failure.clone()),
            None => state
                .parts
                .get_mut(self.rank)
                .and_then(Option::take)
                .ok_or_else(|| Error::Internal {
                    message: format!("{} published no part for rank {}", op, self.rank),
                }),
        };

        self.shared.arrive(&mut state)?;
        drop(state);

        if let Ok(values) = &received {
            trace!(rank = self.rank, op, received = values.len(), "Collective complete");
        }
        received
    }
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn broadcast(&self, values: &[Word], root: usize) -> Result<Vec<Word>> {
        let size = self.shared.size;
        self.exchange("broadcast", root, || Ok(vec![values.to_vec(); size]))
    }

    fn scatter_fixed(&self, values: &[Word], chunk_size: usize, root: usize) -> Result<Vec<Word>> {
        let size = self.shared.size;
        self.exchange("scatter_fixed", root, || {
            split_fixed(values, chunk_size, size)
        })
    }

    fn scatter_variable(
        &self,
        values: &[Word],
        counts: &[usize],
        root: usize,
    ) -> Result<Vec<Word>> {
        let size = self.shared.size;
        self.exchange("scatter_variable", root, || {
            split_variable(values, counts, size)
        })
    }

    fn barrier(&self) -> Result<()> {
        trace!(rank = self.rank, "Entering barrier");
        let mut state = self.shared.state.lock();
        self.shared.arrive(&mut state)
    }
}

impl Drop for LocalCommunicator {
    fn drop(&mut self) {
        if thread::panicking() {
            warn!(rank = self.rank, "Rank panicked, poisoning collective group");
            self.shared.poison();
        }
    }
}
