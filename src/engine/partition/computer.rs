use std::cmp::Ordering;
use std::fmt::Debug;
use std::sync::Arc;

use crate::engine::comm::FrameTupleAccessor;
use crate::engine::data::{BinaryComparator, BinaryHashFunction, combine_hashes};
use crate::engine::errors::FlowError;

/// Maps a tuple to a destination partition in `[0, partitions)`.
///
/// `partitions` is always positive; connectors validate it up front.
pub trait TuplePartitionComputer: Send + Debug {
    fn partition(
        &mut self,
        accessor: &FrameTupleAccessor<'_>,
        tuple: usize,
        partitions: usize,
    ) -> usize;
}

/// Hands every connector instance its own computer.
pub trait PartitionComputerFactory: Send + Sync + Debug {
    fn create(&self) -> Box<dyn TuplePartitionComputer>;
}

/// Reduces a signed hash into `[0, partitions)`.
pub fn reduce(hash: i32, partitions: usize) -> usize {
    let n = partitions as i64;
    ((hash as i64 % n + n) % n) as usize
}

#[derive(Debug, Clone)]
pub struct FieldHashPartitionComputerFactory {
    key_fields: Arc<[usize]>,
    hash_functions: Arc<[Arc<dyn BinaryHashFunction>]>,
}

impl FieldHashPartitionComputerFactory {
    pub fn new(
        key_fields: Vec<usize>,
        hash_functions: Vec<Arc<dyn BinaryHashFunction>>,
    ) -> Result<Self, FlowError> {
        if key_fields.is_empty() {
            return Err(FlowError::invalid_spec("hash partitioning needs key fields"));
        }
        if key_fields.len() != hash_functions.len() {
            return Err(FlowError::invalid_spec(format!(
                "{} key fields but {} hash functions",
                key_fields.len(),
                hash_functions.len()
            )));
        }

        Ok(Self {
            key_fields: key_fields.into(),
            hash_functions: hash_functions.into(),
        })
    }
}

impl PartitionComputerFactory for FieldHashPartitionComputerFactory {
    fn create(&self) -> Box<dyn TuplePartitionComputer> {
        Box::new(FieldHashPartitionComputer {
            key_fields: Arc::clone(&self.key_fields),
            hash_functions: Arc::clone(&self.hash_functions),
        })
    }
}

#[derive(Debug)]
pub struct FieldHashPartitionComputer {
    key_fields: Arc<[usize]>,
    hash_functions: Arc<[Arc<dyn BinaryHashFunction>]>,
}

impl FieldHashPartitionComputer {
    pub fn tuple_hash(&self, accessor: &FrameTupleAccessor<'_>, tuple: usize) -> i32 {
        combine_hashes(
            self.key_fields
                .iter()
                .zip(self.hash_functions.iter())
                .map(|(field, hash)| hash.hash(accessor.field(tuple, *field))),
        )
    }
}

impl TuplePartitionComputer for FieldHashPartitionComputer {
    fn partition(
        &mut self,
        accessor: &FrameTupleAccessor<'_>,
        tuple: usize,
        partitions: usize,
    ) -> usize {
        reduce(self.tuple_hash(accessor, tuple), partitions)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoundRobinPartitionComputerFactory;

impl PartitionComputerFactory for RoundRobinPartitionComputerFactory {
    fn create(&self) -> Box<dyn TuplePartitionComputer> {
        Box::new(RoundRobinPartitionComputer { next: 0 })
    }
}

/// Cycles through partitions regardless of tuple content.
#[derive(Debug)]
pub struct RoundRobinPartitionComputer {
    next: usize,
}

impl TuplePartitionComputer for RoundRobinPartitionComputer {
    fn partition(
        &mut self,
        _accessor: &FrameTupleAccessor<'_>,
        _tuple: usize,
        partitions: usize,
    ) -> usize {
        let current = self.next % partitions;
        self.next = (current + 1) % partitions;
        current
    }
}

/// Routes by where one field falls among sorted split points.
///
/// `k` split points define `k + 1` ranges; ranges are spread evenly over
/// the partitions.
#[derive(Debug, Clone)]
pub struct RangePartitionComputerFactory {
    field: usize,
    split_points: Arc<[Vec<u8>]>,
    comparator: Arc<dyn BinaryComparator>,
}

impl RangePartitionComputerFactory {
    pub fn new(
        field: usize,
        split_points: Vec<Vec<u8>>,
        comparator: Arc<dyn BinaryComparator>,
    ) -> Result<Self, FlowError> {
        let sorted = split_points
            .windows(2)
            .all(|w| comparator.compare(&w[0], &w[1]) == Ordering::Less);
        if !sorted {
            return Err(FlowError::invalid_spec(
                "range split points must be strictly increasing",
            ));
        }

        Ok(Self {
            field,
            split_points: split_points.into(),
            comparator,
        })
    }
}

impl PartitionComputerFactory for RangePartitionComputerFactory {
    fn create(&self) -> Box<dyn TuplePartitionComputer> {
        Box::new(RangePartitionComputer {
            field: self.field,
            split_points: Arc::clone(&self.split_points),
            comparator: Arc::clone(&self.comparator),
        })
    }
}

#[derive(Debug)]
pub struct RangePartitionComputer {
    field: usize,
    split_points: Arc<[Vec<u8>]>,
    comparator: Arc<dyn BinaryComparator>,
}

impl TuplePartitionComputer for RangePartitionComputer {
    fn partition(
        &mut self,
        accessor: &FrameTupleAccessor<'_>,
        tuple: usize,
        partitions: usize,
    ) -> usize {
        let value = accessor.field(tuple, self.field);
        // values equal to a split point belong to the range above it
        let range = self
            .split_points
            .partition_point(|split| self.comparator.compare(split, value) != Ordering::Greater);
        range * partitions / (self.split_points.len() + 1)
    }
}
