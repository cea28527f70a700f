use crate::engine::errors::FlowError;

use super::accessor::FrameTupleAccessor;
use super::frame::{
    FIELD_SLOT_SIZE, TUPLE_COUNT_SIZE, TUPLE_SLOT_SIZE, required_space, tuple_slot_offset,
    write_tuple_count, write_u32,
};
use super::pool::FramePool;
use super::tuple_builder::TupleBuilder;
use super::writer::FrameWriter;

enum TupleSource<'a> {
    Fields { field_ends: &'a [u16], data: &'a [u8] },
    Encoded(&'a [u8]),
}

impl TupleSource<'_> {
    fn encoded_len(&self) -> usize {
        match self {
            TupleSource::Fields { field_ends, data } => {
                field_ends.len() * FIELD_SLOT_SIZE + data.len()
            }
            TupleSource::Encoded(bytes) => bytes.len(),
        }
    }

    fn write_into(&self, dst: &mut [u8]) {
        match self {
            TupleSource::Fields { field_ends, data } => {
                let header = field_ends.len() * FIELD_SLOT_SIZE;
                for (idx, end) in field_ends.iter().enumerate() {
                    let at = idx * FIELD_SLOT_SIZE;
                    dst[at..at + FIELD_SLOT_SIZE].copy_from_slice(&end.to_be_bytes());
                }
                dst[header..header + data.len()].copy_from_slice(data);
            }
            TupleSource::Encoded(bytes) => dst[..bytes.len()].copy_from_slice(bytes),
        }
    }
}

/// Write cursor packing tuples into a frame.
///
/// The frame buffer is allocated on the first append. `append*` returns
/// `Ok(false)` when the tuple does not fit in the remaining space; the
/// caller flushes and retries. A tuple that cannot fit even in an empty
/// frame is reported as [`FlowError::OversizeRecord`].
#[derive(Debug)]
pub struct FrameTupleAppender {
    frame_size: usize,
    frame: Option<Vec<u8>>,
    tuple_count: usize,
    data_end: usize,
    pool: Option<FramePool>,
}

impl FrameTupleAppender {
    pub fn new(frame_size: usize) -> Self {
        Self {
            frame_size,
            frame: None,
            tuple_count: 0,
            data_end: 0,
            pool: None,
        }
    }

    pub fn with_pool(pool: FramePool) -> Self {
        Self {
            frame_size: pool.frame_size(),
            frame: None,
            tuple_count: 0,
            data_end: 0,
            pool: Some(pool),
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn tuple_count(&self) -> usize {
        self.tuple_count
    }

    pub fn is_empty(&self) -> bool {
        self.tuple_count == 0
    }

    pub fn is_allocated(&self) -> bool {
        self.frame.is_some()
    }

    /// Bytes of the frame currently being filled, if one is allocated.
    pub fn frame(&self) -> Option<&[u8]> {
        self.frame.as_deref()
    }

    /// Binds the appender to a fresh frame. Allocation is otherwise lazy.
    pub fn allocate(&mut self) {
        if self.frame.is_none() {
            self.frame = Some(self.new_frame());
        }
        self.clear();
    }

    pub fn append(&mut self, field_ends: &[u16], data: &[u8]) -> Result<bool, FlowError> {
        self.append_source(&TupleSource::Fields { field_ends, data })
    }

    pub fn append_builder(&mut self, builder: &TupleBuilder) -> Result<bool, FlowError> {
        self.append(builder.field_ends(), builder.data())
    }

    /// Copies tuple `tuple` of `accessor` verbatim.
    pub fn append_tuple(
        &mut self,
        accessor: &FrameTupleAccessor<'_>,
        tuple: usize,
    ) -> Result<bool, FlowError> {
        self.append_source(&TupleSource::Encoded(accessor.tuple_bytes(tuple)))
    }

    /// Appends, flushing the current frame to `writer` first if needed.
    pub fn append_builder_to_writer<W: FrameWriter + ?Sized>(
        &mut self,
        writer: &mut W,
        builder: &TupleBuilder,
    ) -> Result<(), FlowError> {
        self.append_to_writer(
            writer,
            TupleSource::Fields {
                field_ends: builder.field_ends(),
                data: builder.data(),
            },
        )
    }

    pub fn append_tuple_to_writer<W: FrameWriter + ?Sized>(
        &mut self,
        writer: &mut W,
        accessor: &FrameTupleAccessor<'_>,
        tuple: usize,
    ) -> Result<(), FlowError> {
        self.append_to_writer(writer, TupleSource::Encoded(accessor.tuple_bytes(tuple)))
    }

    /// Pushes the current frame to `writer` and resets to empty. An empty
    /// frame is only pushed when `force` is set.
    pub fn flush<W: FrameWriter + ?Sized>(
        &mut self,
        writer: &mut W,
        force: bool,
    ) -> Result<(), FlowError> {
        if self.tuple_count == 0 && !force {
            return Ok(());
        }
        if self.frame.is_none() {
            self.allocate();
        }
        if let Some(frame) = self.frame.as_deref() {
            writer.next_frame(frame)?;
        }
        self.clear();
        Ok(())
    }

    /// Drops any buffered tuples without emitting them.
    pub fn discard(&mut self) {
        self.clear();
    }

    fn append_to_writer<W: FrameWriter + ?Sized>(
        &mut self,
        writer: &mut W,
        tuple: TupleSource<'_>,
    ) -> Result<(), FlowError> {
        if self.append_source(&tuple)? {
            return Ok(());
        }
        self.flush(writer, true)?;
        if self.append_source(&tuple)? {
            Ok(())
        } else {
            Err(FlowError::OversizeRecord {
                required: required_space(tuple.encoded_len()),
                capacity: self.frame_size,
            })
        }
    }

    fn append_source(&mut self, tuple: &TupleSource<'_>) -> Result<bool, FlowError> {
        let tuple_len = tuple.encoded_len();
        let required = required_space(tuple_len);
        if required > self.frame_size {
            return Err(FlowError::OversizeRecord {
                required,
                capacity: self.frame_size,
            });
        }

        let used = self.data_end + self.tuple_count * TUPLE_SLOT_SIZE + TUPLE_COUNT_SIZE;
        if used + tuple_len + TUPLE_SLOT_SIZE > self.frame_size {
            return Ok(false);
        }

        if self.frame.is_none() {
            self.allocate();
        }
        let frame_size = self.frame_size;
        let Some(frame) = self.frame.as_mut() else {
            return Ok(false);
        };

        let start = self.data_end;
        tuple.write_into(&mut frame[start..start + tuple_len]);
        self.data_end += tuple_len;
        write_u32(
            frame,
            tuple_slot_offset(frame_size, self.tuple_count),
            self.data_end as u32,
        );
        self.tuple_count += 1;
        write_tuple_count(frame, self.tuple_count);
        Ok(true)
    }

    fn new_frame(&self) -> Vec<u8> {
        match &self.pool {
            Some(pool) => pool.acquire(),
            None => vec![0u8; self.frame_size],
        }
    }

    fn clear(&mut self) {
        self.tuple_count = 0;
        self.data_end = 0;
        if let Some(frame) = self.frame.as_mut() {
            write_tuple_count(frame, 0);
        }
    }
}

impl Drop for FrameTupleAppender {
    fn drop(&mut self) {
        if let (Some(pool), Some(frame)) = (self.pool.as_ref(), self.frame.take()) {
            pool.recycle(frame);
        }
    }
}
