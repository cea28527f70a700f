use std::fmt;

use crate::engine::comm::{FrameTupleAccessor, TupleBuilder};
use crate::engine::errors::FlowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Int32,
    Int64,
    Float32,
    Float64,
    Utf8,
    Bytes,
}

impl FieldType {
    pub fn fixed_len(&self) -> Option<usize> {
        match self {
            FieldType::Int32 | FieldType::Float32 => Some(4),
            FieldType::Int64 | FieldType::Float64 => Some(8),
            FieldType::Utf8 | FieldType::Bytes => None,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, FieldType::Int32 | FieldType::Int64)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            FieldType::Int32 | FieldType::Int64 | FieldType::Float32 | FieldType::Float64
        )
    }

    /// Integer view of a serialized field, widened to `i64`.
    pub fn read_i64(&self, bytes: &[u8]) -> Option<i64> {
        match self {
            FieldType::Int32 => bytes.try_into().ok().map(|b| i32::from_be_bytes(b) as i64),
            FieldType::Int64 => bytes.try_into().ok().map(i64::from_be_bytes),
            _ => None,
        }
    }

    /// Numeric view of a serialized field, widened to `f64`.
    pub fn read_f64(&self, bytes: &[u8]) -> Option<f64> {
        match self {
            FieldType::Int32 | FieldType::Int64 => self.read_i64(bytes).map(|v| v as f64),
            FieldType::Float32 => bytes
                .try_into()
                .ok()
                .map(|b| f32::from_be_bytes(b) as f64),
            FieldType::Float64 => bytes.try_into().ok().map(f64::from_be_bytes),
            FieldType::Utf8 | FieldType::Bytes => None,
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<FieldValue, FlowError> {
        if let Some(len) = self.fixed_len() {
            if bytes.len() != len {
                return Err(FlowError::invalid_data(format!(
                    "{} field expects {} bytes, got {}",
                    self,
                    len,
                    bytes.len()
                )));
            }
        }

        let value = match self {
            FieldType::Int32 => FieldValue::Int32(i32::from_be_bytes(fixed(bytes)?)),
            FieldType::Int64 => FieldValue::Int64(i64::from_be_bytes(fixed(bytes)?)),
            FieldType::Float32 => FieldValue::Float32(f32::from_be_bytes(fixed(bytes)?)),
            FieldType::Float64 => FieldValue::Float64(f64::from_be_bytes(fixed(bytes)?)),
            FieldType::Utf8 => FieldValue::Utf8(
                String::from_utf8(bytes.to_vec())
                    .map_err(|e| FlowError::invalid_data(format!("invalid utf-8 field: {}", e)))?,
            ),
            FieldType::Bytes => FieldValue::Bytes(bytes.to_vec()),
        };
        Ok(value)
    }
}

fn fixed<const N: usize>(bytes: &[u8]) -> Result<[u8; N], FlowError> {
    bytes
        .try_into()
        .map_err(|_| FlowError::invalid_data(format!("expected {} bytes, got {}", N, bytes.len())))
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Int32 => "int32",
            FieldType::Int64 => "int64",
            FieldType::Float32 => "float32",
            FieldType::Float64 => "float64",
            FieldType::Utf8 => "utf8",
            FieldType::Bytes => "bytes",
        };
        f.write_str(name)
    }
}

/// A typed field value, used at the edges of the runtime. Inside frames
/// fields stay opaque byte ranges.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Utf8(String),
    Bytes(Vec<u8>),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Int32(_) => FieldType::Int32,
            FieldValue::Int64(_) => FieldType::Int64,
            FieldValue::Float32(_) => FieldType::Float32,
            FieldValue::Float64(_) => FieldType::Float64,
            FieldValue::Utf8(_) => FieldType::Utf8,
            FieldValue::Bytes(_) => FieldType::Bytes,
        }
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            FieldValue::Int32(v) => out.extend_from_slice(&v.to_be_bytes()),
            FieldValue::Int64(v) => out.extend_from_slice(&v.to_be_bytes()),
            FieldValue::Float32(v) => out.extend_from_slice(&v.to_be_bytes()),
            FieldValue::Float64(v) => out.extend_from_slice(&v.to_be_bytes()),
            FieldValue::Utf8(s) => out.extend_from_slice(s.as_bytes()),
            FieldValue::Bytes(b) => out.extend_from_slice(b),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_to(&mut out);
        out
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int32(v) => Some(*v as i64),
            FieldValue::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int32(v) => Some(*v as f64),
            FieldValue::Int64(v) => Some(*v as f64),
            FieldValue::Float32(v) => Some(*v as f64),
            FieldValue::Float64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Utf8(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int32(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int64(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float64(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Utf8(value.to_string())
    }
}

/// Ordered field types of a record. Shared read-only by every frame that
/// carries the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDescriptor {
    fields: Vec<FieldType>,
}

impl RecordDescriptor {
    pub fn new(fields: Vec<FieldType>) -> Result<Self, FlowError> {
        if fields.is_empty() {
            return Err(FlowError::invalid_spec(
                "record must contain at least one field",
            ));
        }

        Ok(Self { fields })
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn fields(&self) -> &[FieldType] {
        &self.fields
    }

    pub fn field_type(&self, idx: usize) -> Option<FieldType> {
        self.fields.get(idx).copied()
    }

    pub fn accessor<'a>(&self, frame: &'a [u8]) -> FrameTupleAccessor<'a> {
        FrameTupleAccessor::new(self.field_count(), frame)
    }

    /// Serializes `row` into `builder`, which is reset first.
    pub fn serialize_row(
        &self,
        row: &[FieldValue],
        builder: &mut TupleBuilder,
    ) -> Result<(), FlowError> {
        if row.len() != self.fields.len() {
            return Err(FlowError::invalid_spec(format!(
                "row has {} fields, record expects {}",
                row.len(),
                self.fields.len()
            )));
        }

        builder.reset();
        for (idx, (value, expected)) in row.iter().zip(&self.fields).enumerate() {
            if value.field_type() != *expected {
                return Err(FlowError::invalid_spec(format!(
                    "field {} is {}, record expects {}",
                    idx,
                    value.field_type(),
                    expected
                )));
            }
            builder.add_value(value)?;
        }
        Ok(())
    }

    pub fn deserialize_tuple(
        &self,
        accessor: &FrameTupleAccessor<'_>,
        tuple: usize,
    ) -> Result<Vec<FieldValue>, FlowError> {
        self.fields
            .iter()
            .enumerate()
            .map(|(idx, ty)| ty.decode(accessor.field(tuple, idx)))
            .collect()
    }

    /// Decodes every tuple of a frame.
    pub fn decode_frame(&self, frame: &[u8]) -> Result<Vec<Vec<FieldValue>>, FlowError> {
        let accessor = self.accessor(frame);
        (0..accessor.tuple_count())
            .map(|t| self.deserialize_tuple(&accessor, t))
            .collect()
    }
}
