use std::fmt::Debug;
use std::sync::Arc;

use crate::shared::hash::stable_hash64;

use super::record::FieldType;

/// Hashes one serialized field. Results must be identical for identical
/// bytes in every process of a job, since they decide tuple routing.
pub trait BinaryHashFunction: Send + Sync + Debug {
    fn hash(&self, bytes: &[u8]) -> i32;
}

#[inline]
fn fold64(value: u64) -> i32 {
    (value ^ (value >> 32)) as i32
}

/// Integers hash to themselves; 64-bit values fold their halves together.
#[derive(Debug, Clone, Copy)]
pub struct IntegerHash {
    ty: FieldType,
}

impl IntegerHash {
    pub fn int32() -> Self {
        Self {
            ty: FieldType::Int32,
        }
    }

    pub fn int64() -> Self {
        Self {
            ty: FieldType::Int64,
        }
    }
}

impl BinaryHashFunction for IntegerHash {
    fn hash(&self, bytes: &[u8]) -> i32 {
        match (self.ty, self.ty.read_i64(bytes)) {
            (FieldType::Int32, Some(v)) => v as i32,
            (_, Some(v)) => fold64(v as u64),
            (_, None) => BytesHash.hash(bytes),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FloatHash {
    ty: FieldType,
}

impl FloatHash {
    pub fn float32() -> Self {
        Self {
            ty: FieldType::Float32,
        }
    }

    pub fn float64() -> Self {
        Self {
            ty: FieldType::Float64,
        }
    }
}

impl BinaryHashFunction for FloatHash {
    fn hash(&self, bytes: &[u8]) -> i32 {
        match self.ty.read_f64(bytes) {
            Some(v) => fold64(v.to_bits()),
            None => BytesHash.hash(bytes),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BytesHash;

impl BinaryHashFunction for BytesHash {
    fn hash(&self, bytes: &[u8]) -> i32 {
        fold64(stable_hash64(bytes))
    }
}

pub fn hash_function_for(ty: FieldType) -> Arc<dyn BinaryHashFunction> {
    match ty {
        FieldType::Int32 => Arc::new(IntegerHash::int32()),
        FieldType::Int64 => Arc::new(IntegerHash::int64()),
        FieldType::Float32 => Arc::new(FloatHash::float32()),
        FieldType::Float64 => Arc::new(FloatHash::float64()),
        FieldType::Utf8 | FieldType::Bytes => Arc::new(BytesHash),
    }
}

/// Combines per-field hashes as `h = 31 * h + field_hash`.
pub fn combine_hashes<I>(hashes: I) -> i32
where
    I: IntoIterator<Item = i32>,
{
    hashes
        .into_iter()
        .fold(0i32, |h, field| h.wrapping_mul(31).wrapping_add(field))
}
