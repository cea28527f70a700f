use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::engine::comm::FrameWriter;
use crate::engine::context::TaskContext;
use crate::engine::errors::FlowError;

use super::policy::SpillPolicy;
use super::spec::GroupBySpec;
use super::table::SpillableHashTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupPhase {
    Initialized,
    Consuming,
    Draining,
    /// Output emitted and closed.
    Finished,
    /// `fail()` received; spilled runs are gone and nothing will be emitted.
    Failed,
    /// Closed without emitting results.
    Closed,
}

impl fmt::Display for GroupPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GroupPhase::Initialized => "initialized",
            GroupPhase::Consuming => "consuming",
            GroupPhase::Draining => "draining",
            GroupPhase::Finished => "finished",
            GroupPhase::Failed => "failed",
            GroupPhase::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Hash group-by that spills to disk when its table outgrows the budget.
///
/// Tuples are folded into a [`SpillableHashTable`] as frames arrive;
/// results are only produced by `close()`, which drains resident groups
/// and merges spilled partitions into `output`. After `fail()` nothing is
/// emitted and every spill run is deleted.
pub struct ExternalGroupOperator<W: FrameWriter> {
    spec: Arc<GroupBySpec>,
    ctx: TaskContext,
    table: Option<SpillableHashTable>,
    output: W,
    phase: GroupPhase,
}

impl<W: FrameWriter> ExternalGroupOperator<W> {
    pub fn new(spec: Arc<GroupBySpec>, ctx: TaskContext, output: W) -> Result<Self, FlowError> {
        let table = SpillableHashTable::new(Arc::clone(&spec), ctx.clone())?;
        Ok(Self {
            spec,
            ctx,
            table: Some(table),
            output,
            phase: GroupPhase::Initialized,
        })
    }

    pub fn with_policy(mut self, policy: Box<dyn SpillPolicy>) -> Self {
        self.table = self.table.take().map(|t| t.with_policy(policy));
        self
    }

    pub fn phase(&self) -> GroupPhase {
        self.phase
    }

    pub fn spec(&self) -> &Arc<GroupBySpec> {
        &self.spec
    }

    /// `None` once the operator has drained or failed.
    pub fn table(&self) -> Option<&SpillableHashTable> {
        self.table.as_ref()
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn table_mut(&mut self) -> Result<&mut SpillableHashTable, FlowError> {
        let phase = self.phase;
        self.table
            .as_mut()
            .ok_or_else(|| FlowError::usage(format!("group table released while {}", phase)))
    }

    fn consume(&mut self, frame: &[u8]) -> Result<(), FlowError> {
        let spec = Arc::clone(&self.spec);
        let accessor = spec.input().accessor(frame);
        let table = self.table_mut()?;
        for tuple in 0..accessor.tuple_count() {
            table.insert(&accessor, tuple)?;
        }
        Ok(())
    }

    /// Drops the table, deleting its runs, and fails the output.
    fn abort(&mut self) -> Result<(), FlowError> {
        self.phase = GroupPhase::Failed;
        if let Some(mut table) = self.table.take() {
            debug!(
                target: "frameflow::group",
                task = %self.ctx.telemetry().label(),
                runs = table.run_count(),
                "Discarding group table"
            );
            table.discard();
        }
        self.output.fail()
    }
}

impl<W: FrameWriter> FrameWriter for ExternalGroupOperator<W> {
    fn open(&mut self) -> Result<(), FlowError> {
        if self.phase != GroupPhase::Initialized {
            return Err(FlowError::usage(format!(
                "group operator: open() called while {}",
                self.phase
            )));
        }
        if let Err(err) = self.output.open() {
            if let Err(fail_err) = self.abort() {
                warn!(target: "frameflow::group", error = %fail_err, "fail() raised during cleanup");
            }
            return Err(err);
        }
        self.phase = GroupPhase::Consuming;
        Ok(())
    }

    fn next_frame(&mut self, frame: &[u8]) -> Result<(), FlowError> {
        if self.phase != GroupPhase::Consuming {
            return Err(FlowError::usage(format!(
                "group operator: next_frame() called while {}",
                self.phase
            )));
        }
        if let Err(err) = self.consume(frame) {
            if let Err(fail_err) = self.abort() {
                warn!(target: "frameflow::group", error = %fail_err, "fail() raised during cleanup");
            }
            return Err(err);
        }
        Ok(())
    }

    fn fail(&mut self) -> Result<(), FlowError> {
        match self.phase {
            GroupPhase::Initialized | GroupPhase::Consuming | GroupPhase::Draining => self.abort(),
            GroupPhase::Finished | GroupPhase::Failed | GroupPhase::Closed => Ok(()),
        }
    }

    fn close(&mut self) -> Result<(), FlowError> {
        match self.phase {
            GroupPhase::Finished | GroupPhase::Closed => Ok(()),
            GroupPhase::Initialized | GroupPhase::Failed => {
                if let Some(mut table) = self.table.take() {
                    table.discard();
                }
                self.phase = GroupPhase::Closed;
                self.output.close()
            }
            GroupPhase::Consuming | GroupPhase::Draining => {
                self.phase = GroupPhase::Draining;
                let drained = match self.table.take() {
                    Some(mut table) => {
                        let result = table.drain(&mut self.output);
                        if result.is_err() {
                            table.discard();
                        }
                        result
                    }
                    None => Err(FlowError::usage("group table released before draining")),
                };

                match drained {
                    Ok(()) => {
                        self.phase = GroupPhase::Finished;
                        self.output.close()
                    }
                    Err(err) => {
                        self.phase = GroupPhase::Closed;
                        if let Err(fail_err) = self.output.fail() {
                            warn!(target: "frameflow::group", error = %fail_err, "fail() raised during cleanup");
                        }
                        if let Err(close_err) = self.output.close() {
                            warn!(target: "frameflow::group", error = %close_err, "close() raised during cleanup");
                        }
                        Err(err)
                    }
                }
            }
        }
    }
}
