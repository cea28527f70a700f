use std::sync::Arc;

use crate::engine::data::RecordDescriptor;
use crate::engine::group::{AggregateSpec, GroupBySpec};

use super::RecordFactory;

/// Defaults to `count(*)` grouped by field 0 of the `(int32, int64)` record.
pub struct GroupSpecFactory {
    record: RecordDescriptor,
    keys: Vec<usize>,
    aggregates: Vec<AggregateSpec>,
}

impl GroupSpecFactory {
    pub fn new() -> Self {
        Self {
            record: RecordFactory::new().create(),
            keys: vec![0],
            aggregates: vec![AggregateSpec::Count],
        }
    }

    pub fn with_record(mut self, record: RecordDescriptor) -> Self {
        self.record = record;
        self
    }

    pub fn with_keys(mut self, keys: Vec<usize>) -> Self {
        self.keys = keys;
        self
    }

    pub fn with_aggregates(mut self, aggregates: Vec<AggregateSpec>) -> Self {
        self.aggregates = aggregates;
        self
    }

    pub fn create(self) -> GroupBySpec {
        GroupBySpec::new(self.record, self.keys, &self.aggregates).expect("group spec builds")
    }

    pub fn create_shared(self) -> Arc<GroupBySpec> {
        Arc::new(self.create())
    }
}
