//! VlsvError: Unified error type for vlsv-par public APIs
//!
//! Every group-visible operation folds its local outcome into a group-wide
//! consensus before branching, so when one rank returns an error from a
//! collective entry point, every other rank in the group returns one too.

use thiserror::Error;

/// Unified error type for writer operations.
#[derive(Debug, Error)]
pub enum VlsvError {
    /// Protocol misuse detected on this rank: file not open, writer not
    /// initialized, no active multiwrite.
    #[error("precondition failed: {0}")]
    Precondition(&'static str),
    /// Some other rank in the group failed; this rank skipped the collective.
    #[error("group-wide check failed during {0}")]
    GroupAbort(&'static str),
    /// Underlying open/write/resize call failed.
    #[error("collective I/O failure: {0}")]
    Io(#[from] std::io::Error),
    /// Datatype name not one of `int`, `uint`, `float`.
    #[error("unknown datatype `{0}`")]
    UnknownDatatype(String),
    /// Array descriptor or unit does not describe a valid byte span.
    #[error("invalid array descriptor: {0}")]
    InvalidDescriptor(String),
    /// Total bytes of an array are not a whole number of vector elements.
    #[error("array of {total_bytes} bytes is not divisible into {element_bytes}-byte elements")]
    IndivisibleArray { total_bytes: u64, element_bytes: u64 },
    /// Footer could not be serialized or parsed.
    #[error("footer error: {0}")]
    Footer(String),
    /// The 16-byte file header is malformed.
    #[error("header error: {0}")]
    Header(String),
    /// Invalid writer configuration.
    #[error("configuration error: {0}")]
    Config(String),
    /// MPI runtime could not be initialized.
    #[error("MPI error: {0}")]
    Mpi(String),
}

impl VlsvError {
    /// True for errors caused by another rank rather than by this one.
    pub fn is_group_abort(&self) -> bool {
        matches!(self, VlsvError::GroupAbort(_))
    }
}
