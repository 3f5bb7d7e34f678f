//! Thin façade over the collective operations a writer needs from its
//! process group.
//!
//! Every method except [`ProcessGroup::rank`] and [`ProcessGroup::size`] is
//! *collective*: it must be called by every rank of the group, in the same
//! order, the same number of times. A rank that skips a call stalls the rest
//! of the group inside it.
//!
//! Backends:
//! - [`SoloGroup`]: a group of one, for serial runs and unit tests.
//! - [`ThreadGroup`]: ranks simulated by threads of a single process.
//! - `MpiGroup` (feature `mpi-support`): an MPI communicator.

pub mod solo;
pub mod threaded;
#[cfg(feature = "mpi-support")]
pub mod mpi_group;

pub use solo::SoloGroup;
pub use threaded::ThreadGroup;
#[cfg(feature = "mpi-support")]
pub use mpi_group::MpiGroup;

/// Collective operations over a fixed set of ranks.
pub trait ProcessGroup {
    /// This process's rank in `[0, size)`.
    fn rank(&self) -> usize;
    /// Number of ranks in the group.
    fn size(&self) -> usize;

    /// A new group with the same members whose collectives cannot collide
    /// with collectives issued on `self`.
    fn duplicate(&self) -> Self
    where
        Self: Sized;

    fn barrier(&self);

    /// Every rank returns the flag supplied by `root`.
    fn broadcast_flag(&self, root: usize, flag: bool) -> bool;

    /// `root` receives every rank's value in rank order; others get `None`.
    fn gather_u64(&self, root: usize, value: u64) -> Option<Vec<u64>>;

    /// Rank `i` receives `values[i]` from `root`. Non-root ranks pass an
    /// empty slice.
    fn scatter_u64(&self, root: usize, values: &[u64]) -> u64;

    fn all_reduce_max(&self, value: u64) -> u64;

    /// Logical AND across the group.
    fn all_reduce_and(&self, flag: bool) -> bool;
}

/// Fold a local success flag into a group-wide verdict.
///
/// Call this before any collective that a failed rank would otherwise skip:
/// when it returns `false`, every rank takes the same abort branch.
pub fn check_success<G: ProcessGroup + ?Sized>(group: &G, local: bool) -> bool {
    let ok = group.all_reduce_and(local);
    if local && !ok {
        log::warn!("rank {}: another rank reported failure", group.rank());
    }
    ok
}

/// Exclusive prefix sum of `counts`, seeded with `start`.
///
/// Entry `i` is `start + counts[0] + ... + counts[i-1]`. `None` if the end
/// of the last range, `start + sum(counts)`, does not fit in a `u64`.
pub fn exclusive_offsets(start: u64, counts: &[u64]) -> Option<Vec<u64>> {
    let mut acc = start;
    let mut offsets = Vec::with_capacity(counts.len());
    for &n in counts {
        offsets.push(acc);
        acc = acc.checked_add(n)?;
    }
    Some(offsets)
}
