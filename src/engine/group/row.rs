use std::mem::size_of;

use crate::engine::comm::{FrameTupleAccessor, TupleBuilder};
use crate::engine::errors::FlowError;

use super::aggregator::AggState;
use super::spec::GroupBySpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Key fields followed by partial states, as stored in spill runs.
    Partial,
    /// Key fields followed by final aggregate values.
    Final,
}

/// One group: its key fields and one partial state per aggregator.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRow {
    pub keys: Vec<Vec<u8>>,
    pub states: Vec<AggState>,
}

impl GroupRow {
    /// Starts a group from an input tuple.
    pub fn init(
        spec: &GroupBySpec,
        accessor: &FrameTupleAccessor<'_>,
        tuple: usize,
    ) -> Result<Self, FlowError> {
        let keys = spec
            .key_fields()
            .iter()
            .map(|f| accessor.field(tuple, *f).to_vec())
            .collect();
        let states = spec
            .aggregators()
            .iter()
            .map(|agg| agg.init(accessor, tuple))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { keys, states })
    }

    /// Reads a partial tuple written in [`OutputMode::Partial`].
    pub fn decode_partial(
        spec: &GroupBySpec,
        accessor: &FrameTupleAccessor<'_>,
        tuple: usize,
    ) -> Result<Self, FlowError> {
        let key_count = spec.key_count();
        let keys = (0..key_count)
            .map(|f| accessor.field(tuple, f).to_vec())
            .collect();
        let states = spec
            .aggregators()
            .iter()
            .enumerate()
            .map(|(i, agg)| agg.decode_partial(accessor.field(tuple, key_count + i)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { keys, states })
    }

    pub fn aggregate(
        &mut self,
        spec: &GroupBySpec,
        accessor: &FrameTupleAccessor<'_>,
        tuple: usize,
    ) -> Result<(), FlowError> {
        for (agg, state) in spec.aggregators().iter().zip(self.states.iter_mut()) {
            agg.aggregate(state, accessor, tuple)?;
        }
        Ok(())
    }

    pub fn merge(&mut self, spec: &GroupBySpec, other: GroupRow) -> Result<(), FlowError> {
        for ((agg, state), more) in spec
            .aggregators()
            .iter()
            .zip(self.states.iter_mut())
            .zip(other.states)
        {
            agg.merge(state, more)?;
        }
        Ok(())
    }

    pub fn footprint(&self) -> usize {
        size_of::<Self>()
            + self
                .keys
                .iter()
                .map(|k| size_of::<Vec<u8>>() + k.capacity())
                .sum::<usize>()
            + self.states.iter().map(AggState::footprint).sum::<usize>()
    }

    /// Serializes the row into `builder`, which is reset first.
    pub fn write(
        &self,
        spec: &GroupBySpec,
        mode: OutputMode,
        builder: &mut TupleBuilder,
    ) -> Result<(), FlowError> {
        builder.reset();
        for key in &self.keys {
            builder.add_field(key)?;
        }
        for (agg, state) in spec.aggregators().iter().zip(&self.states) {
            match mode {
                OutputMode::Partial => agg.write_partial(state, builder)?,
                OutputMode::Final => agg.write_final(state, builder)?,
            }
        }
        Ok(())
    }
}
