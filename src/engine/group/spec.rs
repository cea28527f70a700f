use std::cmp::Ordering;
use std::sync::Arc;

use crate::engine::comm::FrameTupleAccessor;
use crate::engine::data::{
    BinaryComparator, BinaryHashFunction, RecordDescriptor, combine_hashes, comparator_for,
    compare_fields, hash_function_for,
};
use crate::engine::errors::FlowError;

use super::aggregator::{AggregateSpec, FieldAggregator};

/// Grouping keys, key strategies and aggregators of one group-by.
///
/// Output tuples are `[key fields..., one field per aggregator]`. Spill
/// runs hold partial tuples of the same shape with each aggregator's
/// partial state in place of its final value.
#[derive(Debug, Clone)]
pub struct GroupBySpec {
    input: RecordDescriptor,
    key_fields: Arc<[usize]>,
    comparators: Arc<[Arc<dyn BinaryComparator>]>,
    hash_functions: Arc<[Arc<dyn BinaryHashFunction>]>,
    aggregators: Arc<[Arc<dyn FieldAggregator>]>,
    output: RecordDescriptor,
    partial: RecordDescriptor,
}

impl GroupBySpec {
    /// Uses the default comparator and hash function of each key type.
    pub fn new(
        input: RecordDescriptor,
        key_fields: Vec<usize>,
        aggregates: &[AggregateSpec],
    ) -> Result<Self, FlowError> {
        let mut comparators = Vec::with_capacity(key_fields.len());
        let mut hash_functions = Vec::with_capacity(key_fields.len());
        for &field in &key_fields {
            let ty = input.field_type(field).ok_or_else(|| {
                FlowError::invalid_spec(format!("key field {} out of range", field))
            })?;
            comparators.push(comparator_for(ty));
            hash_functions.push(hash_function_for(ty));
        }

        let aggregators = aggregates
            .iter()
            .map(|spec| spec.build(&input))
            .collect::<Result<Vec<_>, _>>()?;

        Self::with_strategies(input, key_fields, comparators, hash_functions, aggregators)
    }

    pub fn with_strategies(
        input: RecordDescriptor,
        key_fields: Vec<usize>,
        comparators: Vec<Arc<dyn BinaryComparator>>,
        hash_functions: Vec<Arc<dyn BinaryHashFunction>>,
        aggregators: Vec<Arc<dyn FieldAggregator>>,
    ) -> Result<Self, FlowError> {
        if key_fields.is_empty() {
            return Err(FlowError::invalid_spec("group-by needs at least one key field"));
        }
        if comparators.len() != key_fields.len() || hash_functions.len() != key_fields.len() {
            return Err(FlowError::invalid_spec(format!(
                "{} key fields need as many comparators and hash functions, got {} and {}",
                key_fields.len(),
                comparators.len(),
                hash_functions.len()
            )));
        }

        let mut output_types = Vec::with_capacity(key_fields.len() + aggregators.len());
        for &field in &key_fields {
            let ty = input.field_type(field).ok_or_else(|| {
                FlowError::invalid_spec(format!("key field {} out of range", field))
            })?;
            output_types.push(ty);
        }
        let mut partial_types = output_types.clone();
        for agg in &aggregators {
            output_types.push(agg.output_type());
            partial_types.push(agg.partial_type());
        }

        Ok(Self {
            input,
            key_fields: key_fields.into(),
            comparators: comparators.into(),
            hash_functions: hash_functions.into(),
            aggregators: aggregators.into(),
            output: RecordDescriptor::new(output_types)?,
            partial: RecordDescriptor::new(partial_types)?,
        })
    }

    pub fn input(&self) -> &RecordDescriptor {
        &self.input
    }

    pub fn output(&self) -> &RecordDescriptor {
        &self.output
    }

    pub fn partial(&self) -> &RecordDescriptor {
        &self.partial
    }

    pub fn key_fields(&self) -> &[usize] {
        &self.key_fields
    }

    pub fn key_count(&self) -> usize {
        self.key_fields.len()
    }

    pub fn aggregators(&self) -> &[Arc<dyn FieldAggregator>] {
        &self.aggregators
    }

    pub fn comparators(&self) -> &Arc<[Arc<dyn BinaryComparator>]> {
        &self.comparators
    }

    /// Hash of the key fields of an input tuple.
    pub fn key_hash(&self, accessor: &FrameTupleAccessor<'_>, tuple: usize) -> i32 {
        self.hash_keys(self.key_fields.iter().map(|f| accessor.field(tuple, *f)))
    }

    /// Hash of already extracted key fields, in key order.
    pub fn hash_keys<'a, I>(&self, keys: I) -> i32
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        combine_hashes(
            keys.into_iter()
                .zip(self.hash_functions.iter())
                .map(|(bytes, hash)| hash.hash(bytes)),
        )
    }

    pub fn compare_keys<L, R>(&self, left: &[L], right: &[R]) -> Ordering
    where
        L: AsRef<[u8]>,
        R: AsRef<[u8]>,
    {
        compare_fields(&self.comparators, left, right)
    }

    /// Whether the key of input tuple `tuple` equals `keys`.
    pub fn key_matches<K: AsRef<[u8]>>(
        &self,
        keys: &[K],
        accessor: &FrameTupleAccessor<'_>,
        tuple: usize,
    ) -> bool {
        self.key_fields
            .iter()
            .zip(keys)
            .zip(self.comparators.iter())
            .all(|((field, key), cmp)| {
                cmp.compare(key.as_ref(), accessor.field(tuple, *field)) == Ordering::Equal
            })
    }
}
