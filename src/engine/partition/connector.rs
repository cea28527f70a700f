use tracing::{debug, warn};

use crate::engine::comm::{FrameTupleAccessor, FrameTupleAppender, FrameWriter, ProtocolGuard, WriterState};
use crate::engine::context::TaskContext;
use crate::engine::data::RecordDescriptor;
use crate::engine::errors::FlowError;

use super::computer::TuplePartitionComputer;

/// Fans one producer's frames out to `N` consumer writers.
///
/// Each consumer gets its own appender; frame buffers are allocated on the
/// first tuple routed to a consumer, so consumers that receive nothing
/// never hold a frame.
pub struct PartitionDataWriter<W: FrameWriter> {
    field_count: usize,
    writers: Vec<W>,
    closed: Vec<bool>,
    appenders: Vec<FrameTupleAppender>,
    computer: Box<dyn TuplePartitionComputer>,
    guard: ProtocolGuard,
    label: String,
}

impl<W: FrameWriter> PartitionDataWriter<W> {
    pub fn new(
        ctx: &TaskContext,
        record: &RecordDescriptor,
        writers: Vec<W>,
        computer: Box<dyn TuplePartitionComputer>,
    ) -> Result<Self, FlowError> {
        if writers.is_empty() {
            return Err(FlowError::invalid_spec(
                "partitioning connector needs at least one consumer",
            ));
        }

        let appenders = (0..writers.len())
            .map(|_| FrameTupleAppender::with_pool(ctx.pool().clone()))
            .collect();

        Ok(Self {
            field_count: record.field_count(),
            closed: vec![false; writers.len()],
            writers,
            appenders,
            computer,
            guard: ProtocolGuard::new("partitioning connector"),
            label: ctx.telemetry().label(),
        })
    }

    pub fn consumer_count(&self) -> usize {
        self.writers.len()
    }

    pub fn state(&self) -> WriterState {
        self.guard.state()
    }

    /// Consumers currently holding a frame buffer.
    pub fn allocated_frames(&self) -> usize {
        self.appenders.iter().filter(|a| a.is_allocated()).count()
    }

    pub fn into_writers(self) -> Vec<W> {
        let Self { writers, .. } = self;
        writers
    }

    fn route(&mut self, frame: &[u8]) -> Result<(), FlowError> {
        let accessor = FrameTupleAccessor::new(self.field_count, frame);
        let partitions = self.writers.len();

        for tuple in 0..accessor.tuple_count() {
            let target = self.computer.partition(&accessor, tuple, partitions);
            if target >= partitions {
                return Err(FlowError::operator(format!(
                    "partition computer returned {} for {} consumers",
                    target, partitions
                )));
            }
            self.appenders[target].append_tuple_to_writer(
                &mut self.writers[target],
                &accessor,
                tuple,
            )?;
        }
        Ok(())
    }

    /// Fails every consumer, continuing past individual errors.
    fn fail_all(&mut self) -> Result<(), FlowError> {
        let mut first_err = None;
        for (partition, writer) in self.writers.iter_mut().enumerate() {
            if let Err(err) = writer.fail() {
                warn!(
                    target: "frameflow::connector",
                    connector = %self.label, partition, error = %err,
                    "fail() raised by consumer"
                );
                first_err.get_or_insert(err);
            }
        }
        for appender in &mut self.appenders {
            appender.discard();
        }
        first_err.map_or(Ok(()), Err)
    }

    fn close_all(&mut self) -> Option<FlowError> {
        let mut first_err = None;
        for (partition, writer) in self.writers.iter_mut().enumerate() {
            if self.closed[partition] {
                continue;
            }
            self.closed[partition] = true;
            if let Err(err) = writer.close() {
                warn!(
                    target: "frameflow::connector",
                    connector = %self.label, partition, error = %err,
                    "close() raised by consumer"
                );
                first_err.get_or_insert(err);
            }
        }
        first_err
    }

    fn flush_all(&mut self) -> Result<(), FlowError> {
        for (appender, writer) in self.appenders.iter_mut().zip(self.writers.iter_mut()) {
            if !appender.is_empty() {
                appender.flush(writer, true)?;
            }
        }
        Ok(())
    }
}

impl<W: FrameWriter> FrameWriter for PartitionDataWriter<W> {
    fn open(&mut self) -> Result<(), FlowError> {
        self.guard.on_open()?;
        debug!(
            target: "frameflow::connector",
            connector = %self.label, consumers = self.writers.len(),
            "Opening consumers"
        );

        for idx in 0..self.writers.len() {
            if let Err(err) = self.writers[idx].open() {
                warn!(
                    target: "frameflow::connector",
                    connector = %self.label, partition = idx, error = %err,
                    "Consumer failed to open"
                );
                for opened in 0..idx {
                    self.closed[opened] = true;
                    if let Err(close_err) = self.writers[opened].close() {
                        warn!(target: "frameflow::connector", partition = opened, error = %close_err, "close() raised during open cleanup");
                    }
                }
                self.guard.on_fail();
                if let Err(fail_err) = self.fail_all() {
                    warn!(target: "frameflow::connector", error = %fail_err, "fail() raised during open cleanup");
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn next_frame(&mut self, frame: &[u8]) -> Result<(), FlowError> {
        self.guard.on_next_frame()?;
        if let Err(err) = self.route(frame) {
            self.guard.on_fail();
            if let Err(fail_err) = self.fail_all() {
                warn!(target: "frameflow::connector", error = %fail_err, "fail() raised while propagating error");
            }
            return Err(err);
        }
        Ok(())
    }

    fn fail(&mut self) -> Result<(), FlowError> {
        if !self.guard.on_fail() {
            return Ok(());
        }
        debug!(target: "frameflow::connector", connector = %self.label, "Propagating fail() to consumers");
        self.fail_all()
    }

    fn close(&mut self) -> Result<(), FlowError> {
        let Some(previous) = self.guard.on_close() else {
            return Ok(());
        };

        let mut first_err = None;
        if previous == WriterState::Open {
            if let Err(err) = self.flush_all() {
                warn!(
                    target: "frameflow::connector",
                    connector = %self.label, error = %err,
                    "Flush failed on close; failing consumers"
                );
                if let Err(fail_err) = self.fail_all() {
                    warn!(target: "frameflow::connector", error = %fail_err, "fail() raised during close");
                }
                first_err = Some(err);
            }
        }

        let close_err = self.close_all();
        match first_err.or(close_err) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
