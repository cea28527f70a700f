use crate::engine::data::FieldValue;
use crate::engine::errors::FlowError;

use super::frame::FIELD_SLOT_SIZE;

/// Accumulates one tuple's fields before it is appended to a frame.
///
/// Field end offsets are 16-bit, so the payload of a single tuple is capped
/// at `u16::MAX` bytes.
#[derive(Debug, Default, Clone)]
pub struct TupleBuilder {
    field_ends: Vec<u16>,
    data: Vec<u8>,
}

impl TupleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(fields: usize, bytes: usize) -> Self {
        Self {
            field_ends: Vec::with_capacity(fields),
            data: Vec::with_capacity(bytes),
        }
    }

    pub fn reset(&mut self) {
        self.field_ends.clear();
        self.data.clear();
    }

    pub fn field_count(&self) -> usize {
        self.field_ends.len()
    }

    pub fn field_ends(&self) -> &[u16] {
        &self.field_ends
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Size of the tuple once encoded into a frame, header included.
    pub fn encoded_len(&self) -> usize {
        self.field_ends.len() * FIELD_SLOT_SIZE + self.data.len()
    }

    pub fn add_field(&mut self, bytes: &[u8]) -> Result<(), FlowError> {
        self.data.extend_from_slice(bytes);
        self.seal_field()
    }

    pub fn add_value(&mut self, value: &FieldValue) -> Result<(), FlowError> {
        value.write_to(&mut self.data);
        self.seal_field()
    }

    pub fn add_i64(&mut self, value: i64) -> Result<(), FlowError> {
        self.data.extend_from_slice(&value.to_be_bytes());
        self.seal_field()
    }

    pub fn add_f64(&mut self, value: f64) -> Result<(), FlowError> {
        self.data.extend_from_slice(&value.to_be_bytes());
        self.seal_field()
    }

    /// Appends raw bytes to the field currently being built. The field is
    /// finished by [`TupleBuilder::seal_field`].
    pub fn extend_field(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn seal_field(&mut self) -> Result<(), FlowError> {
        let end = u16::try_from(self.data.len()).map_err(|_| FlowError::OversizeRecord {
            required: self.data.len(),
            capacity: u16::MAX as usize,
        })?;
        self.field_ends.push(end);
        Ok(())
    }
}
