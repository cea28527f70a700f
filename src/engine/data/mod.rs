pub mod comparator;
pub mod hash;
pub mod record;

pub use comparator::{
    BinaryComparator, BytesComparator, FloatComparator, IntegerComparator, comparator_for,
    compare_fields,
};
pub use hash::{
    BinaryHashFunction, BytesHash, FloatHash, IntegerHash, combine_hashes, hash_function_for,
};
pub use record::{FieldType, FieldValue, RecordDescriptor};
