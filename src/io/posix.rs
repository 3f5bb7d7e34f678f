//! Positional-write backend: every rank opens the shared path itself and
//! writes its disjoint byte ranges with `pwrite`-style calls.
//!
//! This needs a file system that is coherent across the group (a local disk
//! for thread groups, a parallel file system for MPI runs).

use super::ParallelFile;
use crate::comm::ProcessGroup;
use crate::config::IoHints;
use crate::format::{Endianness, FOOTER_OFFSET_POS, encode_offset};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;

#[derive(Debug)]
pub struct PosixFile {
    file: File,
}

impl ParallelFile for PosixFile {
    fn create<G: ProcessGroup>(path: &Path, group: &G, hints: &IoHints) -> io::Result<Self> {
        for (key, value) in hints.iter() {
            log::trace!("rank {}: io hint {key}={value}", group.rank());
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Self { file })
    }

    fn delete(path: &Path) -> io::Result<()> {
        match fs::remove_file(path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> io::Result<()> {
        write_all_at(&self.file, bytes, offset)
    }

    fn write_at_all(&mut self, offset: u64, spans: &[&[u8]]) -> io::Result<()> {
        let mut pos = offset;
        for span in spans {
            write_all_at(&self.file, span, pos)?;
            pos += span.len() as u64;
        }
        Ok(())
    }

    fn end_offset(&mut self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn set_size(&mut self, len: u64) -> io::Result<()> {
        self.file.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.file.sync_data()
    }

    fn close(self) -> io::Result<()> {
        self.file.sync_all()
    }
}

/// Reopen `path` locally and overwrite the footer-offset placeholder.
///
/// Run by the coordinator alone after the collective close.
pub fn patch_footer_offset(path: &Path, footer_offset: u64) -> io::Result<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    let bytes = encode_offset(footer_offset, Endianness::native());
    write_all_at(&file, &bytes, FOOTER_OFFSET_POS)?;
    file.sync_all()
}

#[cfg(unix)]
fn write_all_at(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(windows)]
fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_write(buf, offset) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
            Ok(n) => {
                buf = &buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
