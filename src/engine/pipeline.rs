use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use tracing::{debug, info};

use crate::engine::comm::{ChannelFrameWriter, FrameChannel, FrameTupleAppender, FrameWriter, TupleBuilder, drive};
use crate::engine::context::TaskContext;
use crate::engine::data::{FieldValue, RecordDescriptor};
use crate::engine::errors::{FlowError, first_root_cause};
use crate::engine::partition::{PartitionComputerFactory, PartitionDataWriter};

/// Feeds frames into an already opened writer. Opening and closing the
/// writer is up to the caller.
pub trait FrameSource: Send {
    fn produce(&mut self, writer: &mut dyn FrameWriter) -> Result<(), FlowError>;
}

/// Replays pre-built frames.
#[derive(Debug, Clone, Default)]
pub struct FrameVecSource {
    frames: Vec<Vec<u8>>,
}

impl FrameVecSource {
    pub fn new(frames: Vec<Vec<u8>>) -> Self {
        Self { frames }
    }
}

impl FrameSource for FrameVecSource {
    fn produce(&mut self, writer: &mut dyn FrameWriter) -> Result<(), FlowError> {
        for frame in &self.frames {
            writer.next_frame(frame)?;
        }
        Ok(())
    }
}

/// Serializes typed rows and packs them into frames as it goes.
#[derive(Debug, Clone)]
pub struct RowsSource {
    record: RecordDescriptor,
    rows: Vec<Vec<FieldValue>>,
    frame_size: usize,
}

impl RowsSource {
    pub fn new(record: RecordDescriptor, rows: Vec<Vec<FieldValue>>, frame_size: usize) -> Self {
        Self {
            record,
            rows,
            frame_size,
        }
    }
}

impl FrameSource for RowsSource {
    fn produce(&mut self, writer: &mut dyn FrameWriter) -> Result<(), FlowError> {
        let mut appender = FrameTupleAppender::new(self.frame_size);
        let mut builder = TupleBuilder::new();
        for row in &self.rows {
            self.record.serialize_row(row, &mut builder)?;
            appender.append_builder_to_writer(writer, &builder)?;
        }
        appender.flush(writer, false)
    }
}

/// Orders failures across the threads of one exchange.
#[derive(Debug, Default)]
struct FailureClock(AtomicU64);

impl FailureClock {
    fn tick(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

/// Remembers when the wrapped writer first returned an error.
struct Stamped<'c, W> {
    inner: W,
    clock: &'c FailureClock,
    failed_at: Option<u64>,
}

impl<'c, W> Stamped<'c, W> {
    fn new(inner: W, clock: &'c FailureClock) -> Self {
        Self {
            inner,
            clock,
            failed_at: None,
        }
    }

    fn stamp<T>(&mut self, result: Result<T, FlowError>) -> Result<T, FlowError> {
        if result.is_err() && self.failed_at.is_none() {
            self.failed_at = Some(self.clock.tick());
        }
        result
    }

    /// When the thread's failure happened; errors raised outside the
    /// writer are stamped on the spot.
    fn failure_order(&mut self) -> u64 {
        match self.failed_at {
            Some(at) => at,
            None => *self.failed_at.insert(self.clock.tick()),
        }
    }
}

impl<W: FrameWriter> FrameWriter for Stamped<'_, W> {
    fn open(&mut self) -> Result<(), FlowError> {
        let result = self.inner.open();
        self.stamp(result)
    }

    fn next_frame(&mut self, frame: &[u8]) -> Result<(), FlowError> {
        let result = self.inner.next_frame(frame);
        self.stamp(result)
    }

    fn fail(&mut self) -> Result<(), FlowError> {
        let result = self.inner.fail();
        self.stamp(result)
    }

    fn close(&mut self) -> Result<(), FlowError> {
        let result = self.inner.close();
        self.stamp(result)
    }
}

/// Runs an M-to-N partitioned exchange, one thread per producer and per
/// consumer.
///
/// Every producer drives its own [`PartitionDataWriter`] (computer from
/// `computer_factory`) whose `N` outputs are rendezvous channels, one per
/// consumer. Consumer `j` receives the frames of all producers for
/// partition `j` and is opened once and closed once. Returns the consumers
/// on success. Otherwise the error is the root cause that happened first
/// across all threads, or the earliest secondary failure when there is
/// no root cause.
pub fn run_exchange<S, C>(
    ctx: &TaskContext,
    record: &RecordDescriptor,
    computer_factory: &dyn PartitionComputerFactory,
    sources: Vec<S>,
    consumers: Vec<C>,
) -> Result<Vec<C>, FlowError>
where
    S: FrameSource,
    C: FrameWriter,
{
    if sources.is_empty() || consumers.is_empty() {
        return Err(FlowError::invalid_spec(format!(
            "exchange needs producers and consumers, got {} and {}",
            sources.len(),
            consumers.len()
        )));
    }

    let producer_count = sources.len();
    let consumer_count = consumers.len();
    let label = ctx.telemetry().label();

    let mut outputs: Vec<Vec<ChannelFrameWriter>> = (0..producer_count)
        .map(|_| Vec::with_capacity(consumer_count))
        .collect();
    let mut receivers = Vec::with_capacity(consumer_count);
    for _ in 0..consumer_count {
        let (writers, receiver) =
            FrameChannel::rendezvous(producer_count, ctx.pool().clone(), Arc::clone(ctx.metrics()));
        for (producer, writer) in writers.into_iter().enumerate() {
            outputs[producer].push(writer);
        }
        receivers.push(receiver);
    }

    let connectors = outputs
        .into_iter()
        .enumerate()
        .map(|(producer, writers)| {
            let producer_ctx = ctx.for_partition("exchange", producer);
            PartitionDataWriter::new(&producer_ctx, record, writers, computer_factory.create())
        })
        .collect::<Result<Vec<_>, _>>()?;

    info!(
        target: "frameflow::pipeline",
        exchange = %label, producers = producer_count, consumers = consumer_count,
        "Starting exchange"
    );

    let clock = FailureClock::default();
    let clock = &clock;

    let outcome = thread::scope(|scope| -> Result<Vec<C>, FlowError> {
        let mut consumer_handles = Vec::with_capacity(consumer_count);
        for (idx, (receiver, consumer)) in receivers.into_iter().zip(consumers).enumerate() {
            let handle = thread::Builder::new()
                .name(format!("{}-consumer-{}", label, idx))
                .spawn_scoped(scope, move || {
                    let mut stamped = Stamped::new(consumer, clock);
                    let outcome = receiver.drive(&mut stamped);
                    let failed_at = match outcome {
                        Ok(()) => None,
                        Err(_) => Some(stamped.failure_order()),
                    };
                    (stamped.inner, outcome, failed_at)
                })?;
            consumer_handles.push(handle);
        }

        let mut producer_handles = Vec::with_capacity(producer_count);
        for (idx, (mut source, connector)) in sources.into_iter().zip(connectors).enumerate() {
            let handle = thread::Builder::new()
                .name(format!("{}-producer-{}", label, idx))
                .spawn_scoped(scope, move || {
                    let mut stamped = Stamped::new(connector, clock);
                    let outcome = drive(&mut stamped, |c| {
                        let produced = source.produce(&mut *c);
                        c.stamp(produced)
                    });
                    outcome.map_err(|err| (stamped.failure_order(), err))
                })?;
            producer_handles.push(handle);
        }

        let mut errors = Vec::new();
        for (idx, handle) in producer_handles.into_iter().enumerate() {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err((at, err))) => {
                    debug!(target: "frameflow::pipeline", producer = idx, order = at, error = %err, "Producer failed");
                    errors.push((at, err));
                }
                Err(_) => errors.push((u64::MAX, FlowError::operator(format!("producer {} panicked", idx)))),
            }
        }

        let mut finished = Vec::with_capacity(consumer_count);
        for (idx, handle) in consumer_handles.into_iter().enumerate() {
            match handle.join() {
                Ok((consumer, Ok(()), _)) => finished.push(consumer),
                Ok((consumer, Err(err), failed_at)) => {
                    let at = failed_at.unwrap_or(u64::MAX);
                    debug!(target: "frameflow::pipeline", consumer = idx, order = at, error = %err, "Consumer failed");
                    errors.push((at, err));
                    finished.push(consumer);
                }
                Err(_) => errors.push((u64::MAX, FlowError::operator(format!("consumer {} panicked", idx)))),
            }
        }

        errors.sort_by_key(|(at, _)| *at);
        match first_root_cause(errors.into_iter().map(|(_, err)| err)) {
            Some(err) => Err(err),
            None => Ok(finished),
        }
    });

    match &outcome {
        Ok(_) => info!(
            target: "frameflow::pipeline",
            exchange = %label,
            frames = ctx.metrics().total_received_frames(),
            bytes = ctx.metrics().total_received_bytes(),
            "Exchange finished"
        ),
        Err(err) => err.log_error(),
    }
    outcome
}
