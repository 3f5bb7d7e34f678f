//! Intra-process group: each rank is a thread, collectives meet on a shared
//! exchange board.
//!
//! Used to exercise the multi-rank protocol without an MPI launcher. The
//! board is a barrier plus one slot per rank; every collective is built on
//! an all-gather of `u64` words.

use super::ProcessGroup;
use parking_lot::Mutex;
use std::sync::{Arc, Barrier};
use std::thread;

struct Board {
    size: usize,
    barrier: Barrier,
    slots: Mutex<Vec<Vec<u64>>>,
    handoff: Mutex<Option<Arc<Board>>>,
}

impl Board {
    fn new(size: usize) -> Arc<Self> {
        Arc::new(Self {
            size,
            barrier: Barrier::new(size),
            slots: Mutex::new(vec![Vec::new(); size]),
            handoff: Mutex::new(None),
        })
    }
}

/// One rank's handle on a thread-simulated group.
#[derive(Clone)]
pub struct ThreadGroup {
    rank: usize,
    board: Arc<Board>,
}

impl std::fmt::Debug for ThreadGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadGroup")
            .field("rank", &self.rank)
            .field("size", &self.board.size)
            .finish()
    }
}

impl ThreadGroup {
    /// Handles for all ranks of a fresh group of `size` ranks.
    ///
    /// Each handle must be moved to its own thread; collectives block until
    /// every handle has joined them.
    pub fn create(size: usize) -> Vec<ThreadGroup> {
        assert!(size > 0, "a process group needs at least one rank");
        let board = Board::new(size);
        (0..size)
            .map(|rank| ThreadGroup {
                rank,
                board: board.clone(),
            })
            .collect()
    }

    /// Run `f` once per rank on `size` scoped threads and collect the
    /// results in rank order.
    pub fn run<R, F>(size: usize, f: F) -> Vec<R>
    where
        F: Fn(ThreadGroup) -> R + Sync,
        R: Send,
    {
        let f = &f;
        thread::scope(|scope| {
            let handles: Vec<_> = Self::create(size)
                .into_iter()
                .map(|group| scope.spawn(move || f(group)))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .collect()
        })
    }

    fn all_gather(&self, words: Vec<u64>) -> Vec<Vec<u64>> {
        self.board.slots.lock()[self.rank] = words;
        self.board.barrier.wait();
        let all = self.board.slots.lock().clone();
        // Nobody may overwrite a slot before everyone has read this round.
        self.board.barrier.wait();
        all
    }
}

impl ProcessGroup for ThreadGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.board.size
    }

    fn duplicate(&self) -> Self {
        if self.rank == 0 {
            *self.board.handoff.lock() = Some(Board::new(self.board.size));
        }
        self.board.barrier.wait();
        let fresh = self.board.handoff.lock().clone();
        self.board.barrier.wait();
        ThreadGroup {
            rank: self.rank,
            board: fresh.unwrap_or_else(|| Board::new(self.board.size)),
        }
    }

    fn barrier(&self) {
        self.board.barrier.wait();
    }

    fn broadcast_flag(&self, root: usize, flag: bool) -> bool {
        let all = self.all_gather(vec![flag as u64]);
        all[root].first().is_some_and(|&w| w != 0)
    }

    fn gather_u64(&self, root: usize, value: u64) -> Option<Vec<u64>> {
        let all = self.all_gather(vec![value]);
        (self.rank == root).then(|| all.iter().map(|w| w.first().copied().unwrap_or(0)).collect())
    }

    fn scatter_u64(&self, root: usize, values: &[u64]) -> u64 {
        let words = if self.rank == root {
            values.to_vec()
        } else {
            Vec::new()
        };
        let all = self.all_gather(words);
        all[root].get(self.rank).copied().unwrap_or(0)
    }

    fn all_reduce_max(&self, value: u64) -> u64 {
        let all = self.all_gather(vec![value]);
        all.iter().filter_map(|w| w.first().copied()).max().unwrap_or(0)
    }

    fn all_reduce_and(&self, flag: bool) -> bool {
        let all = self.all_gather(vec![flag as u64]);
        all.iter().all(|w| w.first().is_some_and(|&v| v != 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gather_scatter_round_trip() {
        let got = ThreadGroup::run(3, |g| {
            let gathered = g.gather_u64(1, 10 * g.rank() as u64);
            let mine = match &gathered {
                Some(all) => g.scatter_u64(1, &all.iter().map(|v| v + 1).collect::<Vec<_>>()),
                None => g.scatter_u64(1, &[]),
            };
            (gathered, mine)
        });
        assert_eq!(got[0], (None, 1));
        assert_eq!(got[1], (Some(vec![0, 10, 20]), 11));
        assert_eq!(got[2], (None, 21));
    }

    #[test]
    fn max_and_broadcast() {
        let got = ThreadGroup::run(4, |g| {
            let m = g.all_reduce_max(g.rank() as u64 * 3);
            let b = g.broadcast_flag(2, g.rank() == 2);
            (m, b)
        });
        assert!(got.iter().all(|&(m, b)| m == 9 && b));
    }

    #[test]
    fn duplicate_is_independent() {
        let got = ThreadGroup::run(2, |g| {
            let dup = g.duplicate();
            let a = dup.all_reduce_max(g.rank() as u64);
            let b = g.all_reduce_max(5);
            (dup.size(), a, b)
        });
        assert_eq!(got, vec![(2, 1, 5), (2, 1, 5)]);
    }

    #[test]
    fn repeated_rounds_do_not_mix() {
        let got = ThreadGroup::run(3, |g| {
            (0..50u64)
                .map(|round| g.all_reduce_max(round + g.rank() as u64))
                .collect::<Vec<_>>()
        });
        let expected: Vec<u64> = (0..50u64).map(|r| r + 2).collect();
        assert!(got.iter().all(|v| *v == expected));
    }
}
