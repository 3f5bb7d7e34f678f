//! Collective file I/O used by the writer.
//!
//! A [`ParallelFile`] is one rank's handle on a file shared by the whole
//! group. `create` and `write_at_all` are collective; `write_at` is an
//! independent write issued by a single rank.

pub mod posix;

pub use posix::{PosixFile, patch_footer_offset};

use crate::comm::ProcessGroup;
use crate::config::IoHints;
use std::io;
use std::path::Path;

/// One rank's handle on a file opened by the whole group.
pub trait ParallelFile: Sized {
    /// Open `path` for writing on every rank, creating it if needed.
    /// Existing contents are not truncated.
    fn create<G: ProcessGroup>(path: &Path, group: &G, hints: &IoHints) -> io::Result<Self>;

    /// Remove `path`; a missing file is not an error.
    fn delete(path: &Path) -> io::Result<()>;

    /// Independent write of `bytes` at `offset`.
    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> io::Result<()>;

    /// Collective write: `spans` are laid down back to back starting at
    /// `offset`. Ranks with nothing to write still call this with no spans.
    fn write_at_all(&mut self, offset: u64, spans: &[&[u8]]) -> io::Result<()>;

    /// Current length of the file in bytes.
    fn end_offset(&mut self) -> io::Result<u64>;

    fn set_size(&mut self, len: u64) -> io::Result<()>;

    /// Flush this rank's writes so other ranks observe them.
    fn sync(&mut self) -> io::Result<()>;

    fn close(self) -> io::Result<()>;
}
