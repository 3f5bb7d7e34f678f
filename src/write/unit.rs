//! `WriteUnit`: one contiguous memory span queued for a collective write.

use crate::format::Datatype;

/// A borrowed span of caller memory plus the primitive type it holds.
///
/// The `'buf` lifetime is the borrow contract of a multiwrite: the span stays
/// borrowed, and therefore unmodified, from the moment it is queued until the
/// session's `end` has moved it to the file.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct WriteUnit<'buf> {
    data: &'buf [u8],
    datatype: Datatype,
    amount: u64,
}

impl<'buf> WriteUnit<'buf> {
    /// `amount` counts primitives (not vector elements); `data` must hold
    /// exactly `amount` of them.
    pub fn new(data: &'buf [u8], datatype: Datatype, amount: u64) -> Self {
        Self {
            data,
            datatype,
            amount,
        }
    }

    pub fn data(&self) -> &'buf [u8] {
        self.data
    }

    pub fn datatype(&self) -> Datatype {
        self.datatype
    }

    /// Number of primitives in the span.
    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn byte_len(&self) -> u64 {
        self.data.len() as u64
    }

    /// Address of the first byte, for ordering checks.
    pub fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }
}
