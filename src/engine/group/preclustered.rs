use std::sync::Arc;

use tracing::warn;

use crate::engine::comm::{FrameTupleAppender, FrameWriter, ProtocolGuard, TupleBuilder, WriterState};
use crate::engine::context::TaskContext;
use crate::engine::errors::FlowError;

use super::row::{GroupRow, OutputMode};
use super::spec::GroupBySpec;

/// Group-by over input already clustered by key: equal keys arrive
/// adjacently, so only the current group is held in memory.
///
/// A key that reappears after another key starts a new group; no attempt
/// is made to detect unclustered input.
pub struct PreclusteredGroupWriter<W: FrameWriter> {
    spec: Arc<GroupBySpec>,
    output: W,
    appender: FrameTupleAppender,
    builder: TupleBuilder,
    current: Option<GroupRow>,
    guard: ProtocolGuard,
}

impl<W: FrameWriter> PreclusteredGroupWriter<W> {
    pub fn new(spec: Arc<GroupBySpec>, ctx: &TaskContext, output: W) -> Self {
        Self {
            spec,
            output,
            appender: FrameTupleAppender::with_pool(ctx.pool().clone()),
            builder: TupleBuilder::new(),
            current: None,
            guard: ProtocolGuard::new("pre-clustered group"),
        }
    }

    pub fn state(&self) -> WriterState {
        self.guard.state()
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn emit(&mut self, row: &GroupRow) -> Result<(), FlowError> {
        row.write(&self.spec, OutputMode::Final, &mut self.builder)?;
        self.appender
            .append_builder_to_writer(&mut self.output, &self.builder)
    }

    fn consume(&mut self, frame: &[u8]) -> Result<(), FlowError> {
        let spec = Arc::clone(&self.spec);
        let accessor = spec.input().accessor(frame);
        for tuple in 0..accessor.tuple_count() {
            let same_group = self
                .current
                .as_ref()
                .is_some_and(|group| spec.key_matches(&group.keys, &accessor, tuple));
            if same_group {
                if let Some(group) = self.current.as_mut() {
                    group.aggregate(&spec, &accessor, tuple)?;
                }
                continue;
            }

            let next = GroupRow::init(&spec, &accessor, tuple)?;
            if let Some(done) = self.current.replace(next) {
                self.emit(&done)?;
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), FlowError> {
        if let Some(done) = self.current.take() {
            self.emit(&done)?;
        }
        self.appender.flush(&mut self.output, false)
    }

    fn cleanup_after(&mut self, err: FlowError) -> FlowError {
        self.guard.on_fail();
        self.current = None;
        self.appender.discard();
        if let Err(fail_err) = self.output.fail() {
            warn!(target: "frameflow::group", error = %fail_err, "fail() raised during cleanup");
        }
        err
    }
}

impl<W: FrameWriter> FrameWriter for PreclusteredGroupWriter<W> {
    fn open(&mut self) -> Result<(), FlowError> {
        self.guard.on_open()?;
        self.output.open().map_err(|err| self.cleanup_after(err))
    }

    fn next_frame(&mut self, frame: &[u8]) -> Result<(), FlowError> {
        self.guard.on_next_frame()?;
        self.consume(frame).map_err(|err| self.cleanup_after(err))
    }

    fn fail(&mut self) -> Result<(), FlowError> {
        if !self.guard.on_fail() {
            return Ok(());
        }
        self.current = None;
        self.appender.discard();
        self.output.fail()
    }

    fn close(&mut self) -> Result<(), FlowError> {
        let Some(previous) = self.guard.on_close() else {
            return Ok(());
        };
        if previous == WriterState::Open {
            if let Err(err) = self.finish() {
                if let Err(fail_err) = self.output.fail() {
                    warn!(target: "frameflow::group", error = %fail_err, "fail() raised during cleanup");
                }
                if let Err(close_err) = self.output.close() {
                    warn!(target: "frameflow::group", error = %close_err, "close() raised during cleanup");
                }
                return Err(err);
            }
        }
        self.output.close()
    }
}
