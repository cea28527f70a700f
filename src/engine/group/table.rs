use std::collections::HashMap;
use std::mem::{self, size_of};
use std::sync::Arc;

use ahash::RandomState;
use tracing::{debug, info};

use crate::engine::comm::{FrameTupleAccessor, FrameTupleAppender, FrameWriter, TupleBuilder, drive};
use crate::engine::context::TaskContext;
use crate::engine::errors::FlowError;
use crate::shared::hash::level_hash;

use super::merger::RunMerger;
use super::policy::{LargestResidentPolicy, PartitionStats, SpillPolicy};
use super::row::{GroupRow, OutputMode};
use super::spec::GroupBySpec;
use super::spill::{RunFile, RunFileWriter};

/// Hash bucket slot plus the cached key hash of each entry.
const ENTRY_OVERHEAD: usize = size_of::<usize>() + size_of::<i32>();

/// Seeds the table's partitioning apart from the connector's `hash % n`
/// routing, which would otherwise leave most table partitions empty.
const TABLE_HASH_LEVEL: u32 = 1;

#[derive(Debug, Default)]
struct SpillPartition {
    entries: Vec<GroupRow>,
    index: HashMap<i32, Vec<usize>, RandomState>,
    bytes: usize,
    runs: Vec<RunFile>,
}

impl SpillPartition {
    fn find(
        &self,
        spec: &GroupBySpec,
        hash: i32,
        accessor: &FrameTupleAccessor<'_>,
        tuple: usize,
    ) -> Option<usize> {
        self.index.get(&hash).and_then(|slots| {
            slots
                .iter()
                .copied()
                .find(|&slot| spec.key_matches(&self.entries[slot].keys, accessor, tuple))
        })
    }

    fn push(&mut self, row: GroupRow, hash: i32, bytes: usize) {
        self.index.entry(hash).or_default().push(self.entries.len());
        self.entries.push(row);
        self.bytes += bytes;
    }

    /// Removes every resident entry, returning them with the bytes freed.
    fn evict(&mut self) -> (Vec<GroupRow>, usize) {
        self.index.clear();
        (mem::take(&mut self.entries), mem::take(&mut self.bytes))
    }
}

/// In-memory group table bounded by a byte budget.
///
/// Keys are split into `spill_partitions` partitions by key hash. When a
/// new key would exceed the budget, whole partitions chosen by the
/// [`SpillPolicy`] are sorted by key and written out as partial runs.
/// A key's state is therefore either resident or in runs of its own
/// partition, never lost.
#[derive(Debug)]
pub struct SpillableHashTable {
    spec: Arc<GroupBySpec>,
    ctx: TaskContext,
    partitions: Vec<SpillPartition>,
    budget: usize,
    used: usize,
    policy: Box<dyn SpillPolicy>,
    builder: TupleBuilder,
}

impl SpillableHashTable {
    pub fn new(spec: Arc<GroupBySpec>, ctx: TaskContext) -> Result<Self, FlowError> {
        let count = ctx.spill_partitions();
        if count == 0 {
            return Err(FlowError::invalid_spec("group table needs at least one spill partition"));
        }

        let partitions = (0..count)
            .map(|_| SpillPartition::default())
            .collect();

        Ok(Self {
            spec,
            budget: ctx.table_budget_bytes(),
            ctx,
            partitions,
            used: 0,
            policy: Box::new(LargestResidentPolicy),
            builder: TupleBuilder::new(),
        })
    }

    pub fn with_policy(mut self, policy: Box<dyn SpillPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn spec(&self) -> &Arc<GroupBySpec> {
        &self.spec
    }

    pub fn used_bytes(&self) -> usize {
        self.used
    }

    pub fn budget_bytes(&self) -> usize {
        self.budget
    }

    pub fn resident_entries(&self) -> usize {
        self.partitions.iter().map(|p| p.entries.len()).sum()
    }

    pub fn run_count(&self) -> usize {
        self.partitions.iter().map(|p| p.runs.len()).sum()
    }

    pub fn stats(&self) -> Vec<PartitionStats> {
        self.partitions
            .iter()
            .enumerate()
            .map(|(partition, p)| PartitionStats {
                partition,
                resident_entries: p.entries.len(),
                resident_bytes: p.bytes,
                runs: p.runs.len(),
            })
            .collect()
    }

    fn partition_of(&self, hash: i32) -> usize {
        (level_hash(hash, TABLE_HASH_LEVEL) % self.partitions.len() as u64) as usize
    }

    /// Folds input tuple `tuple` into its group, creating the group if
    /// needed. Creating a group may first spill partitions to make room.
    pub fn insert(&mut self, accessor: &FrameTupleAccessor<'_>, tuple: usize) -> Result<(), FlowError> {
        let hash = self.spec.key_hash(accessor, tuple);
        let target = self.partition_of(hash);

        let spec = &*self.spec;
        let partition = &mut self.partitions[target];
        if let Some(slot) = partition.find(spec, hash, accessor, tuple) {
            let row = &mut partition.entries[slot];
            let before = row.footprint();
            row.aggregate(spec, accessor, tuple)?;
            let after = row.footprint();
            // min/max over variable-length fields can change size
            partition.bytes = partition.bytes + after - before;
            self.used = self.used + after - before;
            return Ok(());
        }

        let row = GroupRow::init(spec, accessor, tuple)?;
        let bytes = row.footprint() + ENTRY_OVERHEAD;
        while self.used + bytes > self.budget {
            let stats = self.stats();
            match self.policy.select_victim(&stats) {
                Some(victim) => self.spill(victim)?,
                // nothing resident: a lone entry larger than the budget is kept
                None => break,
            }
        }

        self.partitions[target].push(row, hash, bytes);
        self.used += bytes;
        Ok(())
    }

    /// Writes every resident entry of `partition` to a new key-sorted run
    /// and frees their budget.
    pub fn spill(&mut self, partition: usize) -> Result<(), FlowError> {
        let Some(part) = self.partitions.get_mut(partition) else {
            return Err(FlowError::usage(format!(
                "spill of partition {} out of {}",
                partition,
                self.partitions.len()
            )));
        };
        let (mut entries, freed) = part.evict();
        self.used -= freed;
        if entries.is_empty() {
            return Ok(());
        }

        let spec = &*self.spec;
        entries.sort_by(|a, b| spec.compare_keys(&a.keys, &b.keys));

        let label = format!("{}-p{}", self.ctx.telemetry().label(), partition);
        let mut writer = RunFileWriter::create(self.ctx.spill_store(), &label)?;
        let mut appender = FrameTupleAppender::with_pool(self.ctx.pool().clone());
        let builder = &mut self.builder;

        drive(&mut writer, |w| {
            for row in &entries {
                row.write(spec, OutputMode::Partial, builder)?;
                appender.append_builder_to_writer(w, builder)?;
            }
            appender.flush(w, false)
        })?;
        let run = writer.into_run()?;

        self.ctx.metrics().record_spill(run.bytes());
        debug!(
            target: "frameflow::group_table",
            task = %self.ctx.telemetry().label(),
            partition, entries = entries.len(), freed, frames = run.frames(),
            "Spilled partition"
        );
        self.partitions[partition].runs.push(run);
        Ok(())
    }

    /// Emits the final tuple of every resident entry in partitions that
    /// never spilled. Partitions with runs are left for [`Self::merge_spilled`].
    pub fn flush_remaining<W: FrameWriter + ?Sized>(
        &mut self,
        appender: &mut FrameTupleAppender,
        writer: &mut W,
    ) -> Result<(), FlowError> {
        let spec = &*self.spec;
        for partition in self.partitions.iter_mut().filter(|p| p.runs.is_empty()) {
            let (entries, freed) = partition.evict();
            self.used -= freed;
            for row in &entries {
                row.write(spec, OutputMode::Final, &mut self.builder)?;
                appender.append_builder_to_writer(writer, &self.builder)?;
            }
        }
        Ok(())
    }

    /// Spills what is still resident in partitions that already have runs,
    /// then merges each such partition's runs into final tuples.
    pub fn merge_spilled<W: FrameWriter + ?Sized>(
        &mut self,
        appender: &mut FrameTupleAppender,
        writer: &mut W,
    ) -> Result<(), FlowError> {
        for partition in 0..self.partitions.len() {
            if self.partitions[partition].runs.is_empty() {
                continue;
            }
            if !self.partitions[partition].entries.is_empty() {
                self.spill(partition)?;
            }

            let runs = mem::take(&mut self.partitions[partition].runs);
            debug!(
                target: "frameflow::group_table",
                task = %self.ctx.telemetry().label(),
                partition, runs = runs.len(),
                "Merging spilled partition"
            );
            RunMerger::new(&self.spec, &self.ctx).merge_into(runs, appender, writer)?;
        }
        Ok(())
    }

    /// Emits every group as a final tuple and empties the table.
    pub fn drain<W: FrameWriter + ?Sized>(&mut self, writer: &mut W) -> Result<(), FlowError> {
        let runs = self.run_count();
        let mut appender = FrameTupleAppender::with_pool(self.ctx.pool().clone());
        self.flush_remaining(&mut appender, writer)?;
        self.merge_spilled(&mut appender, writer)?;
        appender.flush(writer, false)?;

        if runs > 0 {
            info!(
                target: "frameflow::group_table",
                task = %self.ctx.telemetry().label(),
                runs, merge_passes = self.ctx.metrics().merge_passes(),
                "Drained spilled group table"
            );
        }
        Ok(())
    }

    /// Drops every resident entry and deletes every run.
    pub fn discard(&mut self) {
        for partition in &mut self.partitions {
            partition.evict();
            partition.runs.clear();
        }
        self.used = 0;
    }
}
