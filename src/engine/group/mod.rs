mod aggregator;
mod external_group;
mod merger;
mod policy;
mod preclustered;
mod row;
mod spec;
pub mod spill;
mod table;

pub use aggregator::{
    AggState, AggregateSpec, AvgAggregator, CountAggregator, Extremum, ExtremumAggregator,
    FieldAggregator, FloatSumAggregator, IntSumAggregator,
};
pub use external_group::{ExternalGroupOperator, GroupPhase};
pub use merger::RunMerger;
pub use policy::{FewestRunsPolicy, LargestResidentPolicy, PartitionStats, SpillPolicy};
pub use preclustered::PreclusteredGroupWriter;
pub use row::{GroupRow, OutputMode};
pub use spec::GroupBySpec;
pub use spill::{FileSpillStore, RunFile, RunFileReader, RunFileWriter, SpillStore};
pub use table::SpillableHashTable;

#[cfg(test)]
mod merger_test;
#[cfg(test)]
mod preclustered_test;
#[cfg(test)]
mod table_test;
