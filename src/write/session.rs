//! Multiwrite sessions: one logical array written cooperatively by the
//! whole group.
//!
//! ```text
//! let mut mw = writer.multiwrite();
//! mw.start(Datatype::Float, n_local, 3, 8)?;   // collective
//! mw.add_unit(block_a, n_a)?;                    // local, any number
//! mw.add_unit(block_b, n_b)?;
//! mw.end("VARIABLE", &attributes)?;             // collective
//! ```
//!
//! `start` gathers every rank's byte count on the coordinator, which turns
//! them into disjoint file offsets (an exclusive prefix sum seeded by the
//! running offset) and scatters them back. `end` moves the queued units in
//! batches that respect the per-call ceiling. Collective writes must be
//! issued the same number of times on every rank, so the batch count is
//! negotiated with an all-reduce-max and ranks with less data pad with
//! empty writes.

use crate::comm::{ProcessGroup, check_success, exclusive_offsets};
use crate::footer::FooterRecord;
use crate::format::{ArrayDescriptor, Datatype, Primitive};
use crate::io::ParallelFile;
use crate::vlsv_error::VlsvError;
use crate::write::planner::{batch_bytes, pad_batches, plan_batches, split_span};
use crate::write::unit::WriteUnit;
use crate::writer::Writer;
use std::collections::BTreeMap;
use std::time::Instant;

/// Caller-supplied footer attributes, ordered by name.
pub type Attributes = BTreeMap<String, String>;

/// One multiwrite cycle borrowing the writer and the queued buffers.
///
/// Buffers passed to [`add_unit`](Self::add_unit) stay borrowed for `'buf`,
/// which outlives the `end` call that writes them.
pub struct Multiwrite<'w, 'buf, G: ProcessGroup, F: ParallelFile> {
    writer: &'w mut Writer<G, F>,
    desc: Option<ArrayDescriptor>,
    base_offset: u64,
    units: Vec<WriteUnit<'buf>>,
    active: bool,
    failed: Option<VlsvError>,
}

impl<G: ProcessGroup, F: ParallelFile> Writer<G, F> {
    /// Begin a multiwrite cycle. Nothing collective happens until
    /// [`Multiwrite::start`].
    pub fn multiwrite<'buf>(&mut self) -> Multiwrite<'_, 'buf, G, F> {
        Multiwrite {
            writer: self,
            desc: None,
            base_offset: 0,
            units: Vec::new(),
            active: false,
            failed: None,
        }
    }

    /// Write one contiguous local buffer of `array_size` vector elements as
    /// the array `name`. Collective.
    #[allow(clippy::too_many_arguments)]
    pub fn write_array(
        &mut self,
        name: &str,
        attributes: &Attributes,
        datatype: Datatype,
        array_size: u64,
        vector_size: u64,
        data_size: u64,
        buffer: &[u8],
    ) -> Result<(), VlsvError> {
        let desc = ArrayDescriptor::new(datatype, array_size, vector_size, data_size);
        self.write_described(name, attributes, desc, buffer, Ok(()))
    }

    /// Typed [`write_array`](Self::write_array): `data` holds whole vectors
    /// of `vector_size` scalars each.
    pub fn write_slice<T: Primitive>(
        &mut self,
        name: &str,
        attributes: &Attributes,
        vector_size: u64,
        data: &[T],
    ) -> Result<(), VlsvError> {
        let len = data.len() as u64;
        let (array_size, shape) = match vector_size {
            0 => (0, Err(VlsvError::InvalidDescriptor("vector size is zero".into()))),
            v if len % v != 0 => (
                len / v,
                Err(VlsvError::InvalidDescriptor(format!(
                    "{len} scalars do not form whole vectors of {v}"
                ))),
            ),
            v => (len / v, Ok(())),
        };
        let desc = ArrayDescriptor::for_primitive::<T>(array_size, vector_size.max(1));
        self.write_described(name, attributes, desc, bytemuck::cast_slice(data), shape)
    }

    fn write_described(
        &mut self,
        name: &str,
        attributes: &Attributes,
        desc: ArrayDescriptor,
        buffer: &[u8],
        local_check: Result<(), VlsvError>,
    ) -> Result<(), VlsvError> {
        let Some(group) = self.group.as_ref() else {
            return Err(VlsvError::Precondition("file not open"));
        };
        let ready = self.initialized && local_check.is_ok();
        if !check_success(group, ready) {
            return Err(match local_check {
                Err(e) => e,
                Ok(()) if !self.initialized => VlsvError::Precondition("writer not initialized"),
                Ok(()) => VlsvError::GroupAbort("writeArray"),
            });
        }

        let mut mw = self.multiwrite();
        mw.start(desc.datatype, desc.array_size, desc.vector_size, desc.data_size)?;
        let added = mw.add_unit(buffer, desc.array_size);
        let Some(group) = mw.writer.group.as_ref() else {
            return Err(VlsvError::Precondition("file not open"));
        };
        if !check_success(group, added.is_ok()) {
            return Err(added.err().unwrap_or(VlsvError::GroupAbort("writeArray")));
        }
        mw.end(name, attributes)
    }
}

impl<'w, 'buf, G: ProcessGroup, F: ParallelFile> Multiwrite<'w, 'buf, G, F> {
    /// Collective. Validate the writer state and descriptor on every rank,
    /// then agree on this rank's file offset for the array.
    pub fn start(
        &mut self,
        datatype: Datatype,
        array_size: u64,
        vector_size: u64,
        data_size: u64,
    ) -> Result<(), VlsvError> {
        let desc = ArrayDescriptor::new(datatype, array_size, vector_size, data_size);
        let writer = &mut *self.writer;
        let Some(group) = writer.group.as_ref() else {
            return Err(VlsvError::Precondition("file not open"));
        };

        let local = if !writer.initialized {
            Err(VlsvError::Precondition("writer not initialized"))
        } else {
            desc.validate()
        };
        if !check_success(group, local.is_ok()) {
            self.active = false;
            return Err(local.err().unwrap_or(VlsvError::GroupAbort("startMultiwrite")));
        }

        self.units.clear();
        self.failed = None;
        self.desc = Some(desc);
        let my_bytes = desc.local_bytes()?;

        let coordinator = writer.config.coordinator;
        let gathered = group.gather_u64(coordinator, my_bytes);
        let mut fits = true;
        let offsets = match (gathered, writer.coordinator.as_mut()) {
            (Some(bytes), Some(state)) => {
                match exclusive_offsets(writer.running_offset, &bytes) {
                    Some(offsets) => {
                        state.bytes_per_process = bytes;
                        offsets
                    }
                    None => {
                        // The scatter still runs so every rank issues it.
                        fits = false;
                        vec![0; bytes.len()]
                    }
                }
            }
            _ => Vec::new(),
        };
        self.base_offset = group.scatter_u64(coordinator, &offsets);
        if !check_success(group, fits) {
            self.active = false;
            return Err(VlsvError::InvalidDescriptor(
                "array does not fit below the 2^64-byte file limit".into(),
            ));
        }
        log::debug!(
            "rank {}: array of {my_bytes} bytes at offset {}",
            group.rank(),
            self.base_offset
        );
        self.active = true;
        Ok(())
    }

    /// Queue `elements` vector elements from the front of `data`.
    ///
    /// Local, never collective. Does nothing when the session is not active
    /// or `elements` is zero. Spans larger than one collective call can move
    /// are split into several units.
    pub fn add_unit(&mut self, data: &'buf [u8], elements: u64) -> Result<(), VlsvError> {
        if !self.active || elements == 0 {
            return Ok(());
        }
        let Some(desc) = self.desc.as_ref() else {
            return Ok(());
        };
        match split_span(data, elements, desc, self.writer.config.max_bytes_per_write) {
            Ok(units) => {
                self.units.extend(units);
                Ok(())
            }
            Err(e) => Err(self.poison(e)),
        }
    }

    /// Typed [`add_unit`](Self::add_unit); `T` must match the datatype and
    /// size given to `start`.
    pub fn add_typed_unit<T: Primitive>(
        &mut self,
        data: &'buf [T],
        elements: u64,
    ) -> Result<(), VlsvError> {
        if let Some(desc) = self.desc.as_ref() {
            if self.active && (desc.datatype != T::DATATYPE || desc.data_size != T::SIZE) {
                let e = VlsvError::InvalidDescriptor(format!(
                    "{}-byte {} unit in a {}-byte {} array",
                    T::SIZE,
                    T::DATATYPE,
                    desc.data_size,
                    desc.datatype
                ));
                return Err(self.poison(e));
            }
        }
        self.add_unit(bytemuck::cast_slice(data), elements)
    }

    /// This rank's first payload byte, valid after `start`.
    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Units queued so far.
    pub fn units(&self) -> &[WriteUnit<'buf>] {
        &self.units
    }

    /// Collective. Write every queued unit, record the array in the footer
    /// and advance the running offset.
    ///
    /// After an error the array may be partially written and the footer may
    /// or may not hold its record; callers should stop writing to the file.
    pub fn end(&mut self, tag: &str, attributes: &Attributes) -> Result<(), VlsvError> {
        let writer = &mut *self.writer;
        let Some(group) = writer.group.as_ref() else {
            self.reset();
            return Err(VlsvError::Precondition("file not open"));
        };

        let precondition = if !writer.initialized {
            Some(VlsvError::Precondition("writer not initialized"))
        } else if !self.active {
            Some(VlsvError::Precondition("no active multiwrite"))
        } else {
            self.failed.take()
        };
        let (Some(desc), true) = (self.desc, check_success(group, precondition.is_none())) else {
            self.reset();
            return Err(precondition.unwrap_or(VlsvError::GroupAbort("endMultiwrite")));
        };

        let max_bytes = writer.config.max_bytes_per_write;
        let mut batches = plan_batches(&self.units, max_bytes);
        let my_calls = batches.len() as u64;
        let n_calls = group.all_reduce_max(my_calls) as usize;
        pad_batches(&mut batches, n_calls, self.units.len());
        log::debug!(
            "rank {}: {} units in {my_calls} batches, {n_calls} collective calls",
            group.rank(),
            self.units.len()
        );

        let mut local_error: Option<VlsvError> = None;
        let mut unit_offset = 0u64;
        for range in batches {
            let spans: Vec<&[u8]> = self.units[range.clone()].iter().map(|u| u.data()).collect();
            let offset = self.base_offset + unit_offset;
            if let Some(file) = writer.file.as_mut() {
                let t_start = Instant::now();
                log::trace!(
                    "rank {}: collective write of {} spans at {offset}",
                    group.rank(),
                    spans.len()
                );
                // Keep issuing the remaining calls after a failure so the
                // other ranks are not left waiting.
                if let Err(e) = file.write_at_all(offset, &spans) {
                    local_error.get_or_insert(e.into());
                }
                writer.write_time += t_start.elapsed();
                writer.collective_calls += 1;
            }
            unit_offset += batch_bytes(&self.units, range);
        }

        if let Some(state) = writer.coordinator.as_mut() {
            let total = state
                .bytes_per_process
                .iter()
                .try_fold(0u64, |acc, &n| acc.checked_add(n));
            let end_offset = total.and_then(|t| writer.running_offset.checked_add(t));
            match (total, end_offset) {
                (Some(total), Some(end_offset)) => {
                    let element_bytes = desc.element_bytes();
                    if total % element_bytes != 0 {
                        local_error.get_or_insert(VlsvError::IndivisibleArray {
                            total_bytes: total,
                            element_bytes,
                        });
                    } else {
                        let record = FooterRecord::new(
                            tag,
                            attributes,
                            writer.running_offset,
                            &desc,
                            total / element_bytes,
                        );
                        if let Err(e) = state.footer.push(record) {
                            local_error.get_or_insert(e);
                        }
                    }
                    writer.running_offset = end_offset;
                    writer.bytes_written = writer.bytes_written.saturating_add(total);
                }
                // `start` rejects arrays that run past the u64 range.
                _ => {
                    local_error.get_or_insert(VlsvError::InvalidDescriptor(
                        "array does not fit below the 2^64-byte file limit".into(),
                    ));
                }
            }
        }

        let ok = check_success(group, local_error.is_none());
        self.reset();
        match local_error {
            Some(e) => Err(e),
            None if !ok => Err(VlsvError::GroupAbort("endMultiwrite")),
            None => Ok(()),
        }
    }

    /// Remember a local failure so the next `end` fails group-wide.
    fn poison(&mut self, e: VlsvError) -> VlsvError {
        let msg = match &e {
            VlsvError::InvalidDescriptor(msg) => msg.clone(),
            other => other.to_string(),
        };
        self.failed = Some(VlsvError::InvalidDescriptor(msg));
        e
    }

    fn reset(&mut self) {
        self.active = false;
        self.units.clear();
        self.failed = None;
    }
}
