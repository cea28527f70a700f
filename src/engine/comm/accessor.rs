use super::frame::{FIELD_SLOT_SIZE, read_tuple_count, read_u16, read_u32, tuple_slot_offset};

/// Read-only cursor over the tuples of one frame.
///
/// Field lookups are O(1) through the frame's offset table and each
/// tuple's field header. Slices borrow from the bound buffer, so rebinding
/// with [`FrameTupleAccessor::reset`] cannot leave dangling views.
///
/// The frame format is trusted: a buffer that violates the layout yields
/// meaningless slices or panics on out-of-range reads.
#[derive(Debug, Clone, Copy)]
pub struct FrameTupleAccessor<'a> {
    buf: &'a [u8],
    field_count: usize,
}

impl<'a> FrameTupleAccessor<'a> {
    pub fn new(field_count: usize, buf: &'a [u8]) -> Self {
        Self { buf, field_count }
    }

    pub fn reset(&mut self, buf: &'a [u8]) {
        self.buf = buf;
    }

    pub fn buffer(&self) -> &'a [u8] {
        self.buf
    }

    pub fn field_count(&self) -> usize {
        self.field_count
    }

    pub fn tuple_count(&self) -> usize {
        read_tuple_count(self.buf)
    }

    pub fn tuple_start(&self, tuple: usize) -> usize {
        if tuple == 0 {
            0
        } else {
            self.tuple_end(tuple - 1)
        }
    }

    pub fn tuple_end(&self, tuple: usize) -> usize {
        read_u32(self.buf, tuple_slot_offset(self.buf.len(), tuple)) as usize
    }

    pub fn tuple_len(&self, tuple: usize) -> usize {
        self.tuple_end(tuple) - self.tuple_start(tuple)
    }

    /// Full encoded tuple, header included.
    pub fn tuple_bytes(&self, tuple: usize) -> &'a [u8] {
        &self.buf[self.tuple_start(tuple)..self.tuple_end(tuple)]
    }

    pub fn field_slots_len(&self) -> usize {
        self.field_count * FIELD_SLOT_SIZE
    }

    /// Field start relative to the end of the tuple header.
    pub fn field_start_offset(&self, tuple: usize, field: usize) -> usize {
        if field == 0 {
            0
        } else {
            self.field_end_offset(tuple, field - 1)
        }
    }

    /// Field end relative to the end of the tuple header.
    pub fn field_end_offset(&self, tuple: usize, field: usize) -> usize {
        read_u16(self.buf, self.tuple_start(tuple) + field * FIELD_SLOT_SIZE) as usize
    }

    /// Absolute `(start, len)` of a field inside the bound buffer.
    pub fn field_slice(&self, tuple: usize, field: usize) -> (usize, usize) {
        let base = self.tuple_start(tuple) + self.field_slots_len();
        let start = self.field_start_offset(tuple, field);
        let end = self.field_end_offset(tuple, field);
        (base + start, end - start)
    }

    pub fn field(&self, tuple: usize, field: usize) -> &'a [u8] {
        let (start, len) = self.field_slice(tuple, field);
        &self.buf[start..start + len]
    }

    pub fn fields(&self, tuple: usize) -> impl Iterator<Item = &'a [u8]> + '_ {
        (0..self.field_count).map(move |f| self.field(tuple, f))
    }
}
