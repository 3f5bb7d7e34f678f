//! `Writer`: lifecycle and accounting of one parallel output file.
//!
//! A writer is used collectively: every rank of the group calls the same
//! sequence of methods,
//!
//! ```text
//! open -> (multiwrite start / add_unit* / end | write_array)* -> close
//! ```
//!
//! The coordinator rank owns the footer index and the authoritative running
//! offset; the other ranks only learn their per-array offsets from it.
//!
//! A dry run (`start_dry_run` before `open`) executes every collective and
//! every piece of byte accounting but touches no file, so the coordinator's
//! [`Writer::bytes_written`] afterwards equals the size of the real file.

use crate::comm::{ProcessGroup, check_success};
use crate::config::WriterConfig;
use crate::footer::FooterIndex;
use crate::format::{FileHeader, HEADER_BYTES};
use crate::io::{ParallelFile, PosixFile, patch_footer_offset};
use crate::vlsv_error::VlsvError;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Scratch state that only exists on the coordinator.
#[derive(Debug, Default)]
pub(crate) struct CoordinatorState {
    pub(crate) footer: FooterIndex,
    pub(crate) bytes_per_process: Vec<u64>,
}

/// Collective writer for one open file at a time.
pub struct Writer<G: ProcessGroup, F: ParallelFile = PosixFile> {
    pub(crate) config: WriterConfig,
    pub(crate) group: Option<G>,
    pub(crate) file: Option<F>,
    path: Option<PathBuf>,
    rank: usize,
    file_open: bool,
    pub(crate) initialized: bool,
    pub(crate) dry_running: bool,
    pub(crate) running_offset: u64,
    pub(crate) bytes_written: u64,
    pub(crate) write_time: Duration,
    pub(crate) collective_calls: u64,
    pub(crate) coordinator: Option<CoordinatorState>,
}

impl<G: ProcessGroup, F: ParallelFile> Writer<G, F> {
    pub fn new(config: WriterConfig) -> Self {
        Self {
            config,
            group: None,
            file: None,
            path: None,
            rank: 0,
            file_open: false,
            initialized: false,
            dry_running: false,
            running_offset: 0,
            bytes_written: 0,
            write_time: Duration::ZERO,
            collective_calls: 0,
            coordinator: None,
        }
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Open `path` on every rank of `group`.
    ///
    /// Reopening the file that is already open is a no-op; any other open
    /// file is closed first. The coordinator deletes a pre-existing file,
    /// writes the header and creates the footer index. If the header cannot
    /// be written, every rank rolls back and no file is left behind.
    pub fn open(&mut self, path: impl AsRef<Path>, group: &G) -> Result<(), VlsvError> {
        let path = path.as_ref();
        if self.file_open {
            if self.path.as_deref() == Some(path) {
                return Ok(());
            }
            if let Err(e) = self.close() {
                log::warn!("closing {:?} before reopening failed: {e}", self.path);
            }
        }

        self.config.validate()?;
        let coordinator = self.config.coordinator;
        if coordinator >= group.size() {
            return Err(VlsvError::Config(format!(
                "coordinator rank {coordinator} outside group of {}",
                group.size()
            )));
        }

        let group = group.duplicate();
        self.rank = group.rank();
        let is_coordinator = self.rank == coordinator;
        self.bytes_written = 0;
        self.write_time = Duration::ZERO;
        self.collective_calls = 0;
        self.running_offset = 0;

        // Deletion must finish before anybody recreates the file.
        if !self.dry_running {
            let mut deleted = true;
            if is_coordinator {
                if let Err(e) = F::delete(path) {
                    log::warn!("rank {}: could not remove {}: {e}", self.rank, path.display());
                    deleted = false;
                }
            }
            group.barrier();
            let opened = F::create(path, &group, &self.config.hints);
            let local_ok = deleted && opened.is_ok();
            if !check_success(&group, local_ok) {
                let open_error = match opened {
                    Ok(file) => {
                        let _ = file.close();
                        None
                    }
                    Err(e) => Some(e),
                };
                group.barrier();
                if is_coordinator {
                    let _ = F::delete(path);
                }
                return Err(match open_error {
                    Some(e) => VlsvError::Io(e),
                    None if !deleted => {
                        VlsvError::Precondition("stale file could not be removed")
                    }
                    None => VlsvError::GroupAbort("open"),
                });
            }
            self.file = opened.ok();
        }

        let mut header_error = None;
        if is_coordinator {
            self.coordinator = Some(CoordinatorState {
                footer: FooterIndex::new(),
                bytes_per_process: vec![0; group.size()],
            });

            let t_start = Instant::now();
            if let Some(file) = self.file.as_mut() {
                if let Err(e) = file.write_at(0, &FileHeader::placeholder().encode()) {
                    header_error = Some(e);
                }
            }
            self.write_time += t_start.elapsed();
            self.running_offset += HEADER_BYTES;
            self.bytes_written += HEADER_BYTES;
        }

        let valid = group.broadcast_flag(coordinator, header_error.is_none());
        if !valid {
            log::warn!("rank {}: header write failed, removing {}", self.rank, path.display());
            if let Some(file) = self.file.take() {
                let _ = file.close();
            }
            group.barrier();
            if is_coordinator && !self.dry_running {
                let _ = F::delete(path);
            }
            self.coordinator = None;
            return Err(match header_error {
                Some(e) => VlsvError::Io(e),
                None => VlsvError::GroupAbort("open"),
            });
        }

        if is_coordinator {
            log::info!(
                "opened {} on {} ranks{}",
                path.display(),
                group.size(),
                if self.dry_running { " (dry run)" } else { "" }
            );
        }
        self.group = Some(group);
        self.path = Some(path.to_path_buf());
        self.initialized = true;
        self.file_open = true;
        Ok(())
    }

    /// Append the footer, close the file and patch the footer offset into
    /// the header.
    ///
    /// The footer goes at the coordinator's running offset; the measured end
    /// of file is only logged, so a file pre-sized with `set_size` keeps its
    /// length.
    ///
    /// Fails with [`VlsvError::Precondition`] if no file is open. A failure
    /// after the footer write leaves the file without a usable footer
    /// pointer; nothing is repaired.
    pub fn close(&mut self) -> Result<(), VlsvError> {
        if !self.file_open {
            return Err(VlsvError::Precondition("file not open"));
        }
        let Some(group) = self.group.take() else {
            return Err(VlsvError::Precondition("file not open"));
        };
        let mut local_error: Option<VlsvError> = None;

        if let Some(file) = self.file.as_mut() {
            if let Err(e) = file.sync() {
                local_error = Some(e.into());
            }
        }
        // Every rank's payload must be on disk before the footer goes in.
        group.barrier();

        let mut footer_offset = self.running_offset;
        match self.coordinator.as_ref() {
            Some(state) => {
                let footer = state.footer.to_xml();
                let t_start = Instant::now();
                if let Some(file) = self.file.as_mut() {
                    match file.end_offset() {
                        Ok(end) if end != footer_offset => log::debug!(
                            "file is {end} bytes, payload ends at {footer_offset}; footer follows payload"
                        ),
                        Ok(_) => {}
                        Err(e) => local_error = Some(e.into()),
                    }
                    if let Err(e) = file.write_at_all(footer_offset, &[footer.as_bytes()]) {
                        local_error = Some(e.into());
                    }
                    self.collective_calls += 1;
                }
                self.write_time += t_start.elapsed();
                self.bytes_written += footer.len() as u64;
                log::info!(
                    "footer with {} records at offset {footer_offset}, {} bytes total",
                    state.footer.len(),
                    self.bytes_written
                );
            }
            None => {
                footer_offset = 0;
                if let Some(file) = self.file.as_mut() {
                    if let Err(e) = file.write_at_all(0, &[]) {
                        local_error = Some(e.into());
                    }
                    self.collective_calls += 1;
                }
            }
        }

        group.barrier();
        if let Some(file) = self.file.take() {
            if let Err(e) = file.close() {
                local_error.get_or_insert(e.into());
            }
        }

        if self.coordinator.is_some() && !self.dry_running {
            if let Some(path) = self.path.as_deref() {
                if let Err(e) = patch_footer_offset(path, footer_offset) {
                    local_error.get_or_insert(e.into());
                }
            }
        }

        self.coordinator = None;
        self.initialized = false;
        let ok = check_success(&group, local_error.is_none());
        self.file_open = false;
        self.path = None;
        match local_error {
            Some(e) => Err(e),
            None if !ok => Err(VlsvError::GroupAbort("close")),
            None => Ok(()),
        }
    }

    /// Skip all file I/O from the next `open` on, keeping the accounting.
    pub fn start_dry_run(&mut self) -> Result<(), VlsvError> {
        self.set_dry_running(true)
    }

    pub fn end_dry_run(&mut self) -> Result<(), VlsvError> {
        self.set_dry_running(false)
    }

    fn set_dry_running(&mut self, on: bool) -> Result<(), VlsvError> {
        if self.file_open && self.dry_running != on {
            return Err(VlsvError::Precondition(
                "dry-run mode cannot change while a file is open",
            ));
        }
        self.dry_running = on;
        Ok(())
    }

    /// Resize the open file to exactly `len` bytes, typically the
    /// [`bytes_written`](Self::bytes_written) of a previous dry run.
    /// Collective; a no-op during a dry run.
    pub fn set_size(&mut self, len: u64) -> Result<(), VlsvError> {
        let Some(group) = self.group.as_ref() else {
            return Err(VlsvError::Precondition("file not open"));
        };
        let result = match self.file.as_mut() {
            Some(file) => file.set_size(len),
            None => Ok(()),
        };
        let ok = check_success(group, result.is_ok());
        result?;
        if !ok {
            return Err(VlsvError::GroupAbort("set_size"));
        }
        Ok(())
    }

    /// Bytes written to the file by all ranks. Meaningful on the
    /// coordinator only.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Time this rank spent inside file writes.
    pub fn write_time(&self) -> Duration {
        self.write_time
    }

    /// Next free byte of the file. Meaningful on the coordinator only.
    pub fn running_offset(&self) -> u64 {
        self.running_offset
    }

    /// Collective transfers this rank issued since `open`.
    pub fn collective_calls(&self) -> u64 {
        self.collective_calls
    }

    pub fn is_open(&self) -> bool {
        self.file_open
    }

    pub fn is_dry_running(&self) -> bool {
        self.dry_running
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn is_coordinator(&self) -> bool {
        self.coordinator.is_some()
    }

    /// Footer built so far; `None` except on the coordinator of an open file.
    pub fn footer(&self) -> Option<&FooterIndex> {
        self.coordinator.as_ref().map(|s| &s.footer)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl<G: ProcessGroup, F: ParallelFile> Drop for Writer<G, F> {
    /// Closing is collective: dropping an open writer on only some ranks
    /// stalls the group.
    fn drop(&mut self) {
        if self.file_open {
            if let Err(e) = self.close() {
                log::warn!("rank {}: close on drop failed: {e}", self.rank);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SoloGroup;
    use crate::format::Endianness;
    use std::fs;

    type SoloWriter = Writer<SoloGroup>;

    #[test]
    fn empty_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.vlsv");
        let mut w = SoloWriter::new(WriterConfig::default());
        w.open(&path, &SoloGroup).unwrap();
        assert!(w.is_open());
        assert!(w.is_coordinator());
        assert_eq!(w.running_offset(), HEADER_BYTES);
        w.close().unwrap();
        assert!(!w.is_open());
        assert!(w.footer().is_none());

        let bytes = fs::read(&path).unwrap();
        let hdr = FileHeader::decode(&bytes).unwrap();
        assert_eq!(hdr.endianness, Endianness::native());
        assert_eq!(hdr.footer_offset, HEADER_BYTES);
        assert_eq!(&bytes[16..], b"<VLSV>\n</VLSV>\n");
        assert_eq!(w.bytes_written(), bytes.len() as u64);
    }

    #[test]
    fn close_without_open_fails() {
        let mut w = SoloWriter::new(WriterConfig::default());
        assert!(matches!(w.close(), Err(VlsvError::Precondition(_))));
        assert!(matches!(w.set_size(10), Err(VlsvError::Precondition(_))));
    }

    #[test]
    fn open_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.vlsv");
        fs::write(&path, vec![7u8; 4096]).unwrap();
        let mut w = SoloWriter::new(WriterConfig::default());
        w.open(&path, &SoloGroup).unwrap();
        w.close().unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), 16 + 15);
    }

    #[test]
    fn reopen_same_path_is_noop_and_other_path_closes_first() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.vlsv");
        let b = dir.path().join("b.vlsv");
        let mut w = SoloWriter::new(WriterConfig::default());
        w.open(&a, &SoloGroup).unwrap();
        w.open(&a, &SoloGroup).unwrap();
        assert_eq!(w.path(), Some(a.as_path()));
        w.open(&b, &SoloGroup).unwrap();
        assert_eq!(w.path(), Some(b.as_path()));
        // `a` was finalized with a footer when `b` was opened.
        let a_bytes = fs::read(&a).unwrap();
        assert_eq!(FileHeader::decode(&a_bytes).unwrap().footer_offset, 16);
        w.close().unwrap();
    }

    #[test]
    fn coordinator_outside_group_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = SoloWriter::new(WriterConfig::default().with_coordinator(3));
        let err = w.open(dir.path().join("x.vlsv"), &SoloGroup).unwrap_err();
        assert!(matches!(err, VlsvError::Config(_)));
        assert!(!w.is_open());
    }

    #[test]
    fn dry_run_touches_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dry.vlsv");
        let mut w = SoloWriter::new(WriterConfig::default());
        w.start_dry_run().unwrap();
        w.open(&path, &SoloGroup).unwrap();
        assert!(w.end_dry_run().is_err());
        w.close().unwrap();
        assert!(!path.exists());
        assert_eq!(w.bytes_written(), 16 + 15);
        w.end_dry_run().unwrap();
        assert!(!w.is_dry_running());
    }

    #[test]
    fn open_in_missing_directory_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no/such/dir/file.vlsv");
        let mut w = SoloWriter::new(WriterConfig::default());
        assert!(matches!(w.open(&path, &SoloGroup), Err(VlsvError::Io(_))));
        assert!(!w.is_open());
        assert!(w.footer().is_none());
    }
}
