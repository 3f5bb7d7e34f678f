#![cfg_attr(docsrs, feature(doc_cfg))]
//! # vlsv-par
//!
//! vlsv-par writes VLSV container files from a group of cooperating
//! processes. Each rank contributes a disjoint slice of every array; the
//! slices land in one shared file in rank order, and the coordinator rank
//! appends an XML footer indexing every array when the file is closed. No
//! rank ever holds more than its own slice.
//!
//! ## Features
//! - Collective multiwrite protocol (`start` / `add_unit` / `end`) with
//!   per-call size limits and deadlock-free call-count balancing
//! - Group-wide error consensus: a failure on any rank fails the call on
//!   every rank
//! - Dry runs that compute the exact file size without touching the disk
//! - Pluggable process groups (serial, thread-simulated, MPI)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::collections::BTreeMap;
//! use vlsv_par::prelude::*;
//!
//! # fn main() -> Result<(), VlsvError> {
//! let group = SoloGroup;
//! let mut writer: Writer<SoloGroup> = Writer::new(WriterConfig::default());
//! writer.open("out.vlsv", &group)?;
//! let attrs = BTreeMap::from([("name".to_string(), "rho".to_string())]);
//! writer.write_slice("VARIABLE", &attrs, 1, &[1.0f64, 2.0, 3.0])?;
//! writer.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! With `features = ["mpi-support"]`, use `comm::MpiGroup` and launch with
//! `mpirun`.

pub mod comm;
pub mod config;
pub mod footer;
pub mod format;
pub mod inspect;
pub mod io;
pub mod vlsv_error;
pub mod write;
pub mod writer;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    #[cfg(feature = "mpi-support")]
    pub use crate::comm::MpiGroup;
    pub use crate::comm::{ProcessGroup, SoloGroup, ThreadGroup};
    pub use crate::config::{IoHints, WriterConfig};
    pub use crate::footer::{FooterIndex, FooterRecord};
    pub use crate::format::{ArrayDescriptor, Datatype, Primitive};
    pub use crate::inspect::FileLayout;
    pub use crate::io::{ParallelFile, PosixFile};
    pub use crate::vlsv_error::VlsvError;
    pub use crate::write::{Attributes, Multiwrite, WriteUnit};
    pub use crate::writer::Writer;
}
