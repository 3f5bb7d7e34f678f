//! MPI backend (feature = "mpi-support").

use super::ProcessGroup;
use crate::vlsv_error::VlsvError;
use mpi::collective::SystemOperation;
use mpi::environment::Universe;
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;

/// Process group backed by a private duplicate of an MPI communicator.
pub struct MpiGroup {
    comm: SimpleCommunicator,
}

impl MpiGroup {
    /// Initialize MPI and wrap `MPI_COMM_WORLD`.
    ///
    /// The returned [`Universe`] finalizes MPI when dropped, so keep it alive
    /// for as long as the group is in use.
    pub fn init() -> Result<(Universe, MpiGroup), VlsvError> {
        let universe =
            mpi::initialize().ok_or_else(|| VlsvError::Mpi("MPI already initialized".into()))?;
        let group = MpiGroup::new(&universe.world());
        Ok((universe, group))
    }

    /// Wrap a duplicate of a caller communicator.
    pub fn new(comm: &SimpleCommunicator) -> Self {
        Self {
            comm: comm.duplicate(),
        }
    }

    pub fn communicator(&self) -> &SimpleCommunicator {
        &self.comm
    }
}

impl ProcessGroup for MpiGroup {
    fn rank(&self) -> usize {
        self.comm.rank() as usize
    }

    fn size(&self) -> usize {
        self.comm.size() as usize
    }

    fn duplicate(&self) -> Self {
        Self {
            comm: self.comm.duplicate(),
        }
    }

    fn barrier(&self) {
        self.comm.barrier();
    }

    fn broadcast_flag(&self, root: usize, flag: bool) -> bool {
        let mut word = flag as u8;
        self.comm
            .process_at_rank(root as i32)
            .broadcast_into(&mut word);
        word != 0
    }

    fn gather_u64(&self, root: usize, value: u64) -> Option<Vec<u64>> {
        let root_process = self.comm.process_at_rank(root as i32);
        if self.rank() == root {
            let mut all = vec![0u64; self.size()];
            root_process.gather_into_root(&value, &mut all[..]);
            Some(all)
        } else {
            root_process.gather_into(&value);
            None
        }
    }

    fn scatter_u64(&self, root: usize, values: &[u64]) -> u64 {
        let root_process = self.comm.process_at_rank(root as i32);
        let mut mine = 0u64;
        if self.rank() == root {
            root_process.scatter_into_root(values, &mut mine);
        } else {
            root_process.scatter_into(&mut mine);
        }
        mine
    }

    fn all_reduce_max(&self, value: u64) -> u64 {
        let mut out = 0u64;
        self.comm
            .all_reduce_into(&value, &mut out, SystemOperation::max());
        out
    }

    fn all_reduce_and(&self, flag: bool) -> bool {
        let local = flag as u8;
        let mut out = 0u8;
        self.comm
            .all_reduce_into(&local, &mut out, SystemOperation::min());
        out != 0
    }
}
