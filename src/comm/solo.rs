//! Single-rank group for serial runs.

use super::ProcessGroup;

/// Compile-time no-op group of size one.
#[derive(Clone, Copy, Debug, Default)]
pub struct SoloGroup;

impl ProcessGroup for SoloGroup {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn duplicate(&self) -> Self {
        SoloGroup
    }

    fn barrier(&self) {}

    fn broadcast_flag(&self, _root: usize, flag: bool) -> bool {
        flag
    }

    fn gather_u64(&self, _root: usize, value: u64) -> Option<Vec<u64>> {
        Some(vec![value])
    }

    fn scatter_u64(&self, _root: usize, values: &[u64]) -> u64 {
        values.first().copied().unwrap_or(0)
    }

    fn all_reduce_max(&self, value: u64) -> u64 {
        value
    }

    fn all_reduce_and(&self, flag: bool) -> bool {
        flag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collectives_are_identity() {
        let g = SoloGroup;
        assert_eq!(g.gather_u64(0, 7), Some(vec![7]));
        assert_eq!(g.scatter_u64(0, &[9]), 9);
        assert_eq!(g.all_reduce_max(3), 3);
        assert!(g.broadcast_flag(0, true));
    }
}
