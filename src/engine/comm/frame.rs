//! Frame byte layout.
//!
//! ```text
//! [tuple 0][tuple 1]...[tuple n-1] ...free... [end n-1]...[end 1][end 0][count]
//! ```
//!
//! Tuple payloads are packed from the start of the buffer. The tail holds
//! one big-endian `u32` end offset per tuple, written backward from the end,
//! followed by the big-endian `u32` tuple count in the last four bytes.
//!
//! Each tuple starts with a header of `field_count` big-endian `u16` field
//! end offsets (relative to the end of the header), followed by the field
//! payloads.

pub const DEFAULT_FRAME_SIZE: usize = 32 * 1024;

/// Bytes used by the trailing tuple count.
pub const TUPLE_COUNT_SIZE: usize = 4;

/// Bytes used by one tuple end offset in the trailing offset table.
pub const TUPLE_SLOT_SIZE: usize = 4;

/// Bytes used by one field end offset in a tuple header.
pub const FIELD_SLOT_SIZE: usize = 2;

/// Smallest frame that can carry a single one-field empty tuple.
pub const MIN_FRAME_SIZE: usize = TUPLE_COUNT_SIZE + TUPLE_SLOT_SIZE + FIELD_SLOT_SIZE;

#[inline]
pub fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

#[inline]
pub fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}

#[inline]
pub fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

#[inline]
pub fn tuple_count_offset(capacity: usize) -> usize {
    capacity - TUPLE_COUNT_SIZE
}

/// Position of the end-offset slot for tuple `index`.
#[inline]
pub fn tuple_slot_offset(capacity: usize, index: usize) -> usize {
    capacity - TUPLE_COUNT_SIZE - TUPLE_SLOT_SIZE * (index + 1)
}

pub fn read_tuple_count(frame: &[u8]) -> usize {
    read_u32(frame, tuple_count_offset(frame.len())) as usize
}

pub fn write_tuple_count(frame: &mut [u8], count: usize) {
    let offset = tuple_count_offset(frame.len());
    write_u32(frame, offset, count as u32);
}

/// Bytes a tuple of `tuple_len` encoded bytes needs in an otherwise empty
/// frame: payload, its offset slot and the tuple count.
#[inline]
pub fn required_space(tuple_len: usize) -> usize {
    tuple_len + TUPLE_SLOT_SIZE + TUPLE_COUNT_SIZE
}

/// A zeroed frame of `capacity` bytes, which reads back as holding no tuples.
pub fn empty_frame(capacity: usize) -> Vec<u8> {
    vec![0u8; capacity]
}
