use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::mem;
use std::sync::Arc;

use tracing::debug;

use crate::engine::comm::{FrameTupleAccessor, FrameTupleAppender, FrameWriter, TupleBuilder, drive};
use crate::engine::context::TaskContext;
use crate::engine::data::{BinaryComparator, compare_fields};
use crate::engine::errors::FlowError;

use super::row::{GroupRow, OutputMode};
use super::spec::GroupBySpec;
use super::spill::{RunFile, RunFileReader, RunFileWriter};

/// Merges key-sorted spill runs of one partition, combining equal keys
/// with each aggregator's `merge`.
///
/// Runs are given oldest first. Equal keys are merged in run order, so
/// aggregators that keep the first-seen value see the same order a
/// single in-memory table would.
pub struct RunMerger<'a> {
    spec: &'a GroupBySpec,
    ctx: &'a TaskContext,
}

impl<'a> RunMerger<'a> {
    pub fn new(spec: &'a GroupBySpec, ctx: &'a TaskContext) -> Self {
        Self { spec, ctx }
    }

    /// Merges `runs` into final tuples appended to `writer`.
    ///
    /// With more runs than the configured fan-in, the oldest runs are first
    /// merged into intermediate runs until one pass suffices. Every input
    /// run is deleted once consumed.
    pub fn merge_into<W: FrameWriter + ?Sized>(
        &self,
        mut runs: Vec<RunFile>,
        appender: &mut FrameTupleAppender,
        writer: &mut W,
    ) -> Result<(), FlowError> {
        let fan_in = self.ctx.merge_fan_in().max(2);
        while runs.len() > fan_in {
            let batch: Vec<RunFile> = runs.drain(..fan_in).collect();
            let merged = self.merge_to_run(&batch)?;
            drop(batch);
            runs.insert(0, merged);
        }
        self.merge_runs(&runs, OutputMode::Final, appender, writer)
    }

    fn merge_to_run(&self, runs: &[RunFile]) -> Result<RunFile, FlowError> {
        let label = format!("{}-merge", self.ctx.telemetry().label());
        let mut output = RunFileWriter::create(self.ctx.spill_store(), &label)?;
        let mut appender = FrameTupleAppender::with_pool(self.ctx.pool().clone());

        drive(&mut output, |w| {
            self.merge_runs(runs, OutputMode::Partial, &mut appender, w)?;
            appender.flush(w, false)
        })?;
        let run = output.into_run()?;

        self.ctx.metrics().record_merge_pass();
        debug!(
            target: "frameflow::merger",
            task = %self.ctx.telemetry().label(),
            inputs = runs.len(), frames = run.frames(), bytes = run.bytes(),
            "Merged runs into intermediate run"
        );
        Ok(run)
    }

    fn merge_runs<W: FrameWriter + ?Sized>(
        &self,
        runs: &[RunFile],
        mode: OutputMode,
        appender: &mut FrameTupleAppender,
        writer: &mut W,
    ) -> Result<(), FlowError> {
        let mut streams = runs
            .iter()
            .map(|run| RunStream::open(run, self.spec))
            .collect::<Result<Vec<_>, _>>()?;

        let comparators = Arc::clone(self.spec.comparators());
        let mut heap = BinaryHeap::with_capacity(streams.len());
        for (idx, stream) in streams.iter_mut().enumerate() {
            if let Some(row) = stream.next_row(self.spec)? {
                heap.push(HeapItem {
                    run: idx,
                    row,
                    comparators: Arc::clone(&comparators),
                });
            }
        }

        let mut builder = TupleBuilder::new();
        let mut current: Option<GroupRow> = None;

        while let Some(item) = heap.pop() {
            let HeapItem {
                run,
                row,
                comparators,
            } = item;

            if let Some(next) = streams[run].next_row(self.spec)? {
                heap.push(HeapItem {
                    run,
                    row: next,
                    comparators,
                });
            }

            match current.as_mut() {
                Some(group) if self.spec.compare_keys(&group.keys, &row.keys) == Ordering::Equal => {
                    group.merge(self.spec, row)?;
                }
                Some(group) => {
                    let done = mem::replace(group, row);
                    done.write(self.spec, mode, &mut builder)?;
                    appender.append_builder_to_writer(writer, &builder)?;
                }
                None => current = Some(row),
            }
        }

        if let Some(done) = current {
            done.write(self.spec, mode, &mut builder)?;
            appender.append_builder_to_writer(writer, &builder)?;
        }
        Ok(())
    }
}

/// Decodes one run's partial tuples in order.
struct RunStream {
    reader: RunFileReader,
    frame: Vec<u8>,
    field_count: usize,
    tuple: usize,
    tuple_count: usize,
}

impl RunStream {
    fn open(run: &RunFile, spec: &GroupBySpec) -> Result<Self, FlowError> {
        Ok(Self {
            reader: run.open_reader()?,
            frame: Vec::new(),
            field_count: spec.partial().field_count(),
            tuple: 0,
            tuple_count: 0,
        })
    }

    fn next_row(&mut self, spec: &GroupBySpec) -> Result<Option<GroupRow>, FlowError> {
        loop {
            if self.tuple < self.tuple_count {
                let accessor = FrameTupleAccessor::new(self.field_count, &self.frame);
                let row = GroupRow::decode_partial(spec, &accessor, self.tuple)?;
                self.tuple += 1;
                return Ok(Some(row));
            }

            if !self.reader.read_frame(&mut self.frame)? {
                return Ok(None);
            }
            self.tuple = 0;
            self.tuple_count = FrameTupleAccessor::new(self.field_count, &self.frame).tuple_count();
        }
    }
}

struct HeapItem {
    run: usize,
    row: GroupRow,
    comparators: Arc<[Arc<dyn BinaryComparator>]>,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem {
    // BinaryHeap is a max-heap: reverse so the smallest key, then the
    // oldest run, pops first.
    fn cmp(&self, other: &Self) -> Ordering {
        compare_fields(&self.comparators, &other.row.keys, &self.row.keys)
            .then_with(|| other.run.cmp(&self.run))
    }
}
