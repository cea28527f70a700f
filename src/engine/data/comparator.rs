use std::cmp::Ordering;
use std::fmt::Debug;
use std::sync::Arc;

use super::record::FieldType;

/// Orders two serialized fields of the same domain.
pub trait BinaryComparator: Send + Sync + Debug {
    fn compare(&self, left: &[u8], right: &[u8]) -> Ordering;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BytesComparator;

impl BinaryComparator for BytesComparator {
    fn compare(&self, left: &[u8], right: &[u8]) -> Ordering {
        left.cmp(right)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerComparator {
    ty: IntWidth,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum IntWidth {
    #[default]
    I32,
    I64,
}

impl IntegerComparator {
    pub fn int32() -> Self {
        Self { ty: IntWidth::I32 }
    }

    pub fn int64() -> Self {
        Self { ty: IntWidth::I64 }
    }

    fn decode(&self, bytes: &[u8]) -> Option<i64> {
        match self.ty {
            IntWidth::I32 => FieldType::Int32.read_i64(bytes),
            IntWidth::I64 => FieldType::Int64.read_i64(bytes),
        }
    }
}

impl BinaryComparator for IntegerComparator {
    fn compare(&self, left: &[u8], right: &[u8]) -> Ordering {
        match (self.decode(left), self.decode(right)) {
            (Some(l), Some(r)) => l.cmp(&r),
            _ => left.cmp(right),
        }
    }
}

/// Total order over floats: `-0.0 < 0.0` and NaN sorts last.
#[derive(Debug, Clone, Copy)]
pub struct FloatComparator {
    ty: FieldType,
}

impl FloatComparator {
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

impl BinaryComparator for FloatComparator {
    fn compare(&self, left: &[u8], right: &[u8]) -> Ordering {
        match (self.ty.read_f64(left), self.ty.read_f64(right)) {
            (Some(l), Some(r)) => l.total_cmp(&r),
            _ => left.cmp(right),
        }
    }
}

pub fn comparator_for(ty: FieldType) -> Arc<dyn BinaryComparator> {
    match ty {
        FieldType::Int32 => Arc::new(IntegerComparator::int32()),
        FieldType::Int64 => Arc::new(IntegerComparator::int64()),
        FieldType::Float32 => Arc::new(FloatComparator::float32()),
        FieldType::Float64 => Arc::new(FloatComparator::float64()),
        FieldType::Utf8 | FieldType::Bytes => Arc::new(BytesComparator),
    }
}

/// Lexicographic comparison of multi-field keys.
pub fn compare_fields<L, R>(
    comparators: &[Arc<dyn BinaryComparator>],
    left: &[L],
    right: &[R],
) -> Ordering
where
    L: AsRef<[u8]>,
    R: AsRef<[u8]>,
{
    for ((cmp, l), r) in comparators.iter().zip(left).zip(right) {
        let ord = cmp.compare(l.as_ref(), r.as_ref());
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}
