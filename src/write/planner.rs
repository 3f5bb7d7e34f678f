//! Batch planning for collective writes. Pure arithmetic, no I/O.
//!
//! Two limits shape a multiwrite:
//! - a single queued span is cut into units no larger than one call can move
//!   ([`split_span`]);
//! - queued units are grouped into batches whose byte total fits one call
//!   ([`plan_batches`]), and every rank pads its batch list to the group-wide
//!   maximum ([`pad_batches`]) so all ranks issue the same number of calls.

use crate::format::ArrayDescriptor;
use crate::vlsv_error::VlsvError;
use crate::write::unit::WriteUnit;
use std::ops::Range;

/// Vector elements that fit in one collective call; never less than one.
pub fn max_elements_per_call(max_bytes: u64, data_size: u64, vector_size: u64) -> u64 {
    let element_bytes = data_size.saturating_mul(vector_size).max(1);
    (max_bytes / element_bytes).max(1)
}

/// Cut `elements` vector elements starting at `data` into units of at most
/// [`max_elements_per_call`] elements each.
///
/// Units are contiguous, disjoint and in ascending address order; their
/// element counts sum to `elements`. Zero elements yields no units.
pub fn split_span<'buf>(
    data: &'buf [u8],
    elements: u64,
    desc: &ArrayDescriptor,
    max_bytes: u64,
) -> Result<Vec<WriteUnit<'buf>>, VlsvError> {
    if elements == 0 {
        return Ok(Vec::new());
    }
    let element_bytes = desc.element_bytes();
    let needed = elements
        .checked_mul(element_bytes)
        .ok_or_else(|| VlsvError::InvalidDescriptor(format!("{elements} elements overflow")))?;
    if (data.len() as u64) < needed {
        return Err(VlsvError::InvalidDescriptor(format!(
            "unit of {elements} elements needs {needed} bytes, buffer has {}",
            data.len()
        )));
    }

    let per_call = max_elements_per_call(max_bytes, desc.data_size, desc.vector_size);
    let n_units = elements.div_ceil(per_call);
    let mut units = Vec::with_capacity(n_units as usize);
    let mut start = 0usize;
    for i in 0..n_units {
        let count = per_call.min(elements - i * per_call);
        let len = (count * element_bytes) as usize;
        units.push(WriteUnit::new(
            &data[start..start + len],
            desc.datatype,
            count * desc.vector_size,
        ));
        start += len;
    }
    Ok(units)
}

/// Group `units` into consecutive batches of at most `max_bytes` each.
///
/// A batch is closed whenever the next unit would push it over the limit.
/// A unit larger than the limit still gets a batch of its own. No units, no
/// batches.
pub fn plan_batches(units: &[WriteUnit<'_>], max_bytes: u64) -> Vec<Range<usize>> {
    let mut batches = Vec::new();
    let mut first = 0usize;
    let mut bytes = 0u64;
    for (i, unit) in units.iter().enumerate() {
        if i > first && bytes + unit.byte_len() > max_bytes {
            batches.push(first..i);
            first = i;
            bytes = 0;
        }
        bytes += unit.byte_len();
    }
    if first < units.len() {
        batches.push(first..units.len());
    }
    batches
}

/// Append empty batches until there are `n_calls` of them.
pub fn pad_batches(batches: &mut Vec<Range<usize>>, n_calls: usize, n_units: usize) {
    while batches.len() < n_calls {
        batches.push(n_units..n_units);
    }
}

/// Bytes moved by the units in `range`.
pub fn batch_bytes(units: &[WriteUnit<'_>], range: Range<usize>) -> u64 {
    units[range].iter().map(WriteUnit::byte_len).sum()
}
