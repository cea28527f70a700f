use std::cmp::Ordering;
use std::fmt::Debug;
use std::mem::size_of;
use std::sync::Arc;

use crate::engine::comm::{FrameTupleAccessor, TupleBuilder};
use crate::engine::data::{BinaryComparator, FieldType, RecordDescriptor, comparator_for};
use crate::engine::errors::FlowError;

/// Partial aggregate state of one output field.
#[derive(Debug, Clone, PartialEq)]
pub enum AggState {
    Int(i64),
    Float(f64),
    Avg { sum: f64, count: i64 },
    Bytes(Vec<u8>),
}

impl AggState {
    /// Approximate resident size, counted against the table budget.
    pub fn footprint(&self) -> usize {
        match self {
            AggState::Bytes(bytes) => size_of::<AggState>() + bytes.capacity(),
            _ => size_of::<AggState>(),
        }
    }
}

/// Folds raw tuples into a partial state and merges partial states.
///
/// `aggregate` folds one input tuple; `merge` combines two partial states
/// (from different spill runs) and must agree with folding both inputs.
pub trait FieldAggregator: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    fn output_type(&self) -> FieldType;

    /// Type of the serialized partial state stored in spill runs.
    fn partial_type(&self) -> FieldType;

    fn init(&self, accessor: &FrameTupleAccessor<'_>, tuple: usize) -> Result<AggState, FlowError>;

    fn aggregate(
        &self,
        state: &mut AggState,
        accessor: &FrameTupleAccessor<'_>,
        tuple: usize,
    ) -> Result<(), FlowError>;

    fn decode_partial(&self, bytes: &[u8]) -> Result<AggState, FlowError>;

    fn merge(&self, state: &mut AggState, other: AggState) -> Result<(), FlowError>;

    fn write_partial(&self, state: &AggState, builder: &mut TupleBuilder) -> Result<(), FlowError>;

    fn write_final(&self, state: &AggState, builder: &mut TupleBuilder) -> Result<(), FlowError>;
}

fn state_mismatch(name: &str, state: &AggState) -> FlowError {
    FlowError::operator(format!("{} aggregator got incompatible state {:?}", name, state))
}

fn read_int(ty: FieldType, bytes: &[u8]) -> Result<i64, FlowError> {
    ty.read_i64(bytes)
        .ok_or_else(|| FlowError::invalid_data(format!("cannot read {} as integer", ty)))
}

fn read_float(ty: FieldType, bytes: &[u8]) -> Result<f64, FlowError> {
    ty.read_f64(bytes)
        .ok_or_else(|| FlowError::invalid_data(format!("cannot read {} as number", ty)))
}

#[derive(Debug, Clone, Default)]
pub struct CountAggregator;

impl FieldAggregator for CountAggregator {
    fn name(&self) -> &'static str {
        "count"
    }

    fn output_type(&self) -> FieldType {
        FieldType::Int64
    }

    fn partial_type(&self) -> FieldType {
        FieldType::Int64
    }

    fn init(&self, _accessor: &FrameTupleAccessor<'_>, _tuple: usize) -> Result<AggState, FlowError> {
        Ok(AggState::Int(1))
    }

    fn aggregate(
        &self,
        state: &mut AggState,
        _accessor: &FrameTupleAccessor<'_>,
        _tuple: usize,
    ) -> Result<(), FlowError> {
        match state {
            AggState::Int(count) => {
                *count += 1;
                Ok(())
            }
            other => Err(state_mismatch(self.name(), other)),
        }
    }

    fn decode_partial(&self, bytes: &[u8]) -> Result<AggState, FlowError> {
        read_int(FieldType::Int64, bytes).map(AggState::Int)
    }

    fn merge(&self, state: &mut AggState, other: AggState) -> Result<(), FlowError> {
        match (state, other) {
            (AggState::Int(count), AggState::Int(more)) => {
                *count += more;
                Ok(())
            }
            (state, _) => Err(state_mismatch(self.name(), state)),
        }
    }

    fn write_partial(&self, state: &AggState, builder: &mut TupleBuilder) -> Result<(), FlowError> {
        match state {
            AggState::Int(count) => builder.add_i64(*count),
            other => Err(state_mismatch(self.name(), other)),
        }
    }

    fn write_final(&self, state: &AggState, builder: &mut TupleBuilder) -> Result<(), FlowError> {
        self.write_partial(state, builder)
    }
}

/// Integer sum accumulated in 64 bits, wrapping on overflow.
#[derive(Debug, Clone)]
pub struct IntSumAggregator {
    field: usize,
    ty: FieldType,
}

impl IntSumAggregator {
    pub fn new(field: usize, ty: FieldType) -> Self {
        Self { field, ty }
    }
}

impl FieldAggregator for IntSumAggregator {
    fn name(&self) -> &'static str {
        "sum"
    }

    fn output_type(&self) -> FieldType {
        FieldType::Int64
    }

    fn partial_type(&self) -> FieldType {
        FieldType::Int64
    }

    fn init(&self, accessor: &FrameTupleAccessor<'_>, tuple: usize) -> Result<AggState, FlowError> {
        read_int(self.ty, accessor.field(tuple, self.field)).map(AggState::Int)
    }

    fn aggregate(
        &self,
        state: &mut AggState,
        accessor: &FrameTupleAccessor<'_>,
        tuple: usize,
    ) -> Result<(), FlowError> {
        let value = read_int(self.ty, accessor.field(tuple, self.field))?;
        match state {
            AggState::Int(sum) => {
                *sum = sum.wrapping_add(value);
                Ok(())
            }
            other => Err(state_mismatch(self.name(), other)),
        }
    }

    fn decode_partial(&self, bytes: &[u8]) -> Result<AggState, FlowError> {
        read_int(FieldType::Int64, bytes).map(AggState::Int)
    }

    fn merge(&self, state: &mut AggState, other: AggState) -> Result<(), FlowError> {
        match (state, other) {
            (AggState::Int(sum), AggState::Int(more)) => {
                *sum = sum.wrapping_add(more);
                Ok(())
            }
            (state, _) => Err(state_mismatch(self.name(), state)),
        }
    }

    fn write_partial(&self, state: &AggState, builder: &mut TupleBuilder) -> Result<(), FlowError> {
        match state {
            AggState::Int(sum) => builder.add_i64(*sum),
            other => Err(state_mismatch(self.name(), other)),
        }
    }

    fn write_final(&self, state: &AggState, builder: &mut TupleBuilder) -> Result<(), FlowError> {
        self.write_partial(state, builder)
    }
}

#[derive(Debug, Clone)]
pub struct FloatSumAggregator {
    field: usize,
    ty: FieldType,
}

impl FloatSumAggregator {
    pub fn new(field: usize, ty: FieldType) -> Self {
        Self { field, ty }
    }
}

impl FieldAggregator for FloatSumAggregator {
    fn name(&self) -> &'static str {
        "sum"
    }

    fn output_type(&self) -> FieldType {
        FieldType::Float64
    }

    fn partial_type(&self) -> FieldType {
        FieldType::Float64
    }

    fn init(&self, accessor: &FrameTupleAccessor<'_>, tuple: usize) -> Result<AggState, FlowError> {
        read_float(self.ty, accessor.field(tuple, self.field)).map(AggState::Float)
    }

    fn aggregate(
        &self,
        state: &mut AggState,
        accessor: &FrameTupleAccessor<'_>,
        tuple: usize,
    ) -> Result<(), FlowError> {
        let value = read_float(self.ty, accessor.field(tuple, self.field))?;
        match state {
            AggState::Float(sum) => {
                *sum += value;
                Ok(())
            }
            other => Err(state_mismatch(self.name(), other)),
        }
    }

    fn decode_partial(&self, bytes: &[u8]) -> Result<AggState, FlowError> {
        read_float(FieldType::Float64, bytes).map(AggState::Float)
    }

    fn merge(&self, state: &mut AggState, other: AggState) -> Result<(), FlowError> {
        match (state, other) {
            (AggState::Float(sum), AggState::Float(more)) => {
                *sum += more;
                Ok(())
            }
            (state, _) => Err(state_mismatch(self.name(), state)),
        }
    }

    fn write_partial(&self, state: &AggState, builder: &mut TupleBuilder) -> Result<(), FlowError> {
        match state {
            AggState::Float(sum) => builder.add_f64(*sum),
            other => Err(state_mismatch(self.name(), other)),
        }
    }

    fn write_final(&self, state: &AggState, builder: &mut TupleBuilder) -> Result<(), FlowError> {
        self.write_partial(state, builder)
    }
}

/// Average over a numeric field. The partial state keeps the running sum
/// and count (16 bytes: `f64` sum, `i64` count) so runs merge exactly.
#[derive(Debug, Clone)]
pub struct AvgAggregator {
    field: usize,
    ty: FieldType,
}

impl AvgAggregator {
    pub fn new(field: usize, ty: FieldType) -> Self {
        Self { field, ty }
    }
}

impl FieldAggregator for AvgAggregator {
    fn name(&self) -> &'static str {
        "avg"
    }

    fn output_type(&self) -> FieldType {
        FieldType::Float64
    }

    fn partial_type(&self) -> FieldType {
        FieldType::Bytes
    }

    fn init(&self, accessor: &FrameTupleAccessor<'_>, tuple: usize) -> Result<AggState, FlowError> {
        let value = read_float(self.ty, accessor.field(tuple, self.field))?;
        Ok(AggState::Avg {
            sum: value,
            count: 1,
        })
    }

    fn aggregate(
        &self,
        state: &mut AggState,
        accessor: &FrameTupleAccessor<'_>,
        tuple: usize,
    ) -> Result<(), FlowError> {
        let value = read_float(self.ty, accessor.field(tuple, self.field))?;
        match state {
            AggState::Avg { sum, count } => {
                *sum += value;
                *count += 1;
                Ok(())
            }
            other => Err(state_mismatch(self.name(), other)),
        }
    }

    fn decode_partial(&self, bytes: &[u8]) -> Result<AggState, FlowError> {
        if bytes.len() != 16 {
            return Err(FlowError::invalid_data(format!(
                "avg partial state needs 16 bytes, got {}",
                bytes.len()
            )));
        }
        let sum = read_float(FieldType::Float64, &bytes[..8])?;
        let count = read_int(FieldType::Int64, &bytes[8..])?;
        Ok(AggState::Avg { sum, count })
    }

    fn merge(&self, state: &mut AggState, other: AggState) -> Result<(), FlowError> {
        match (state, other) {
            (
                AggState::Avg { sum, count },
                AggState::Avg {
                    sum: more_sum,
                    count: more_count,
                },
            ) => {
                *sum += more_sum;
                *count += more_count;
                Ok(())
            }
            (state, _) => Err(state_mismatch(self.name(), state)),
        }
    }

    fn write_partial(&self, state: &AggState, builder: &mut TupleBuilder) -> Result<(), FlowError> {
        match state {
            AggState::Avg { sum, count } => {
                builder.extend_field(&sum.to_be_bytes());
                builder.extend_field(&count.to_be_bytes());
                builder.seal_field()
            }
            other => Err(state_mismatch(self.name(), other)),
        }
    }

    fn write_final(&self, state: &AggState, builder: &mut TupleBuilder) -> Result<(), FlowError> {
        match state {
            AggState::Avg { sum, count } if *count > 0 => builder.add_f64(*sum / *count as f64),
            AggState::Avg { .. } => builder.add_f64(0.0),
            other => Err(state_mismatch(self.name(), other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extremum {
    Min,
    Max,
}

/// Min or max of one field under the field's comparator. On ties the
/// first-seen value is kept.
#[derive(Debug, Clone)]
pub struct ExtremumAggregator {
    field: usize,
    ty: FieldType,
    kind: Extremum,
    comparator: Arc<dyn BinaryComparator>,
}

impl ExtremumAggregator {
    pub fn new(
        field: usize,
        ty: FieldType,
        kind: Extremum,
        comparator: Arc<dyn BinaryComparator>,
    ) -> Self {
        Self {
            field,
            ty,
            kind,
            comparator,
        }
    }

    fn replaces(&self, candidate: &[u8], current: &[u8]) -> bool {
        let ord = self.comparator.compare(candidate, current);
        match self.kind {
            Extremum::Min => ord == Ordering::Less,
            Extremum::Max => ord == Ordering::Greater,
        }
    }
}

impl FieldAggregator for ExtremumAggregator {
    fn name(&self) -> &'static str {
        match self.kind {
            Extremum::Min => "min",
            Extremum::Max => "max",
        }
    }

    fn output_type(&self) -> FieldType {
        self.ty
    }

    fn partial_type(&self) -> FieldType {
        self.ty
    }

    fn init(&self, accessor: &FrameTupleAccessor<'_>, tuple: usize) -> Result<AggState, FlowError> {
        Ok(AggState::Bytes(accessor.field(tuple, self.field).to_vec()))
    }

    fn aggregate(
        &self,
        state: &mut AggState,
        accessor: &FrameTupleAccessor<'_>,
        tuple: usize,
    ) -> Result<(), FlowError> {
        let candidate = accessor.field(tuple, self.field);
        match state {
            AggState::Bytes(current) => {
                if self.replaces(candidate, current) {
                    current.clear();
                    current.extend_from_slice(candidate);
                }
                Ok(())
            }
            other => Err(state_mismatch(self.name(), other)),
        }
    }

    fn decode_partial(&self, bytes: &[u8]) -> Result<AggState, FlowError> {
        Ok(AggState::Bytes(bytes.to_vec()))
    }

    fn merge(&self, state: &mut AggState, other: AggState) -> Result<(), FlowError> {
        match (state, other) {
            (AggState::Bytes(current), AggState::Bytes(candidate)) => {
                if self.replaces(&candidate, current) {
                    *current = candidate;
                }
                Ok(())
            }
            (state, _) => Err(state_mismatch(self.name(), state)),
        }
    }

    fn write_partial(&self, state: &AggState, builder: &mut TupleBuilder) -> Result<(), FlowError> {
        match state {
            AggState::Bytes(bytes) => builder.add_field(bytes),
            other => Err(state_mismatch(self.name(), other)),
        }
    }

    fn write_final(&self, state: &AggState, builder: &mut TupleBuilder) -> Result<(), FlowError> {
        self.write_partial(state, builder)
    }
}

/// Declarative aggregate over input field indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateSpec {
    Count,
    Sum { field: usize },
    Avg { field: usize },
    Min { field: usize },
    Max { field: usize },
}

impl AggregateSpec {
    pub fn build(&self, input: &RecordDescriptor) -> Result<Arc<dyn FieldAggregator>, FlowError> {
        let field_type = |field: usize| {
            input.field_type(field).ok_or_else(|| {
                FlowError::invalid_spec(format!(
                    "aggregate field {} out of range for {} fields",
                    field,
                    input.field_count()
                ))
            })
        };

        let aggregator: Arc<dyn FieldAggregator> = match *self {
            AggregateSpec::Count => Arc::new(CountAggregator),
            AggregateSpec::Sum { field } => {
                let ty = field_type(field)?;
                if ty.is_integer() {
                    Arc::new(IntSumAggregator::new(field, ty))
                } else if ty.is_numeric() {
                    Arc::new(FloatSumAggregator::new(field, ty))
                } else {
                    return Err(FlowError::invalid_spec(format!(
                        "sum over non-numeric {} field {}",
                        ty, field
                    )));
                }
            }
            AggregateSpec::Avg { field } => {
                let ty = field_type(field)?;
                if !ty.is_numeric() {
                    return Err(FlowError::invalid_spec(format!(
                        "avg over non-numeric {} field {}",
                        ty, field
                    )));
                }
                Arc::new(AvgAggregator::new(field, ty))
            }
            AggregateSpec::Min { field } => {
                let ty = field_type(field)?;
                Arc::new(ExtremumAggregator::new(field, ty, Extremum::Min, comparator_for(ty)))
            }
            AggregateSpec::Max { field } => {
                let ty = field_type(field)?;
                Arc::new(ExtremumAggregator::new(field, ty, Extremum::Max, comparator_for(ty)))
            }
        };
        Ok(aggregator)
    }
}
