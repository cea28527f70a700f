use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, warn};

use crate::engine::errors::FlowError;

use super::metrics::FlowMetrics;
use super::pool::FramePool;
use super::writer::{FrameWriter, ProtocolGuard, WriterState};

#[derive(Debug)]
pub enum FrameMessage {
    Open,
    Frame(Vec<u8>),
    Fail,
    Close,
}

#[derive(Debug)]
struct Envelope {
    sender: usize,
    message: FrameMessage,
}

/// Producer half of a frame channel. Every call blocks until the consumer
/// thread has taken the message: at most one frame is in flight.
pub struct ChannelFrameWriter {
    sender_id: usize,
    tx: Sender<Envelope>,
    guard: ProtocolGuard,
    pool: FramePool,
    metrics: Arc<FlowMetrics>,
}

impl ChannelFrameWriter {
    pub fn sender_id(&self) -> usize {
        self.sender_id
    }

    pub fn state(&self) -> WriterState {
        self.guard.state()
    }

    fn send(&self, message: FrameMessage) -> Result<(), FlowError> {
        self.tx
            .send(Envelope {
                sender: self.sender_id,
                message,
            })
            .map_err(|_| FlowError::ChannelClosed)
    }
}

impl FrameWriter for ChannelFrameWriter {
    fn open(&mut self) -> Result<(), FlowError> {
        self.guard.on_open()?;
        self.send(FrameMessage::Open)
    }

    fn next_frame(&mut self, frame: &[u8]) -> Result<(), FlowError> {
        self.guard.on_next_frame()?;
        let bytes = frame.len() as u64;
        self.send(FrameMessage::Frame(self.pool.acquire_copy(frame)))?;
        self.metrics.on_send_success(bytes);
        Ok(())
    }

    fn fail(&mut self) -> Result<(), FlowError> {
        if !self.guard.on_fail() {
            return Ok(());
        }
        self.metrics.record_fail();
        // A consumer that already hung up has nothing left to abort.
        if self.send(FrameMessage::Fail).is_err() {
            debug!(
                target: "frameflow::channel",
                sender = self.sender_id,
                "Consumer gone before fail() was delivered"
            );
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), FlowError> {
        let Some(previous) = self.guard.on_close() else {
            return Ok(());
        };
        match self.send(FrameMessage::Close) {
            Ok(()) => Ok(()),
            Err(_) if previous == WriterState::Failed => Ok(()),
            Err(err) => Err(err),
        }
    }
}

/// Consumer half of a frame channel fed by one or more producers.
pub struct FrameReceiver {
    rx: Receiver<Envelope>,
    senders: usize,
    pool: FramePool,
    metrics: Arc<FlowMetrics>,
}

impl FrameReceiver {
    pub fn senders(&self) -> usize {
        self.senders
    }

    /// Replays the producers' protocol into `writer` until every producer
    /// has closed or hung up.
    ///
    /// The first `open` opens `writer`; the first `fail` (or a producer
    /// vanishing without `close`) fails it and turns the outcome into
    /// [`FlowError::UpstreamFailed`]. `writer` is closed on every path.
    pub fn drive<W: FrameWriter + ?Sized>(self, writer: &mut W) -> Result<(), FlowError> {
        let FrameReceiver {
            rx,
            senders,
            pool,
            metrics,
        } = self;

        let mut closed = vec![false; senders];
        let mut closed_count = 0usize;
        let mut downstream_open = false;
        let mut upstream_failed = false;

        let outcome: Result<(), FlowError> = loop {
            let envelope = match rx.recv() {
                Ok(envelope) => envelope,
                Err(_) => {
                    if closed_count < senders && !upstream_failed {
                        warn!(
                            target: "frameflow::channel",
                            closed = closed_count, senders,
                            "Producers hung up without closing"
                        );
                        upstream_failed = true;
                        if let Err(err) = writer.fail() {
                            warn!(target: "frameflow::channel", error = %err, "fail() raised while aborting consumer");
                        }
                    }
                    break Ok(());
                }
            };

            match envelope.message {
                FrameMessage::Open => {
                    if !downstream_open {
                        if let Err(err) = writer.open() {
                            break Err(err);
                        }
                        downstream_open = true;
                    }
                }
                FrameMessage::Frame(frame) => {
                    metrics.on_receive(frame.len() as u64);
                    if upstream_failed {
                        pool.recycle(frame);
                        continue;
                    }
                    let delivered = writer.next_frame(&frame);
                    pool.recycle(frame);
                    if let Err(err) = delivered {
                        break Err(err);
                    }
                }
                FrameMessage::Fail => {
                    if !upstream_failed {
                        debug!(
                            target: "frameflow::channel",
                            sender = envelope.sender,
                            "Producer signalled fail()"
                        );
                        upstream_failed = true;
                        if let Err(err) = writer.fail() {
                            warn!(target: "frameflow::channel", error = %err, "fail() raised while aborting consumer");
                        }
                    }
                }
                FrameMessage::Close => {
                    if let Some(flag) = closed.get_mut(envelope.sender) {
                        if !*flag {
                            *flag = true;
                            closed_count += 1;
                        }
                    }
                    if closed_count == senders {
                        break Ok(());
                    }
                }
            }
        };

        // Unblock producers parked on the rendezvous before cleaning up.
        drop(rx);

        match outcome {
            Ok(()) if !upstream_failed => writer.close(),
            Ok(()) => {
                if let Err(err) = writer.close() {
                    warn!(target: "frameflow::channel", error = %err, "close() raised after upstream failure");
                }
                Err(FlowError::UpstreamFailed)
            }
            Err(err) => {
                if !upstream_failed {
                    if let Err(fail_err) = writer.fail() {
                        warn!(target: "frameflow::channel", error = %fail_err, "fail() raised during cleanup");
                    }
                }
                if let Err(close_err) = writer.close() {
                    warn!(target: "frameflow::channel", error = %close_err, "close() raised during cleanup");
                }
                Err(err)
            }
        }
    }
}

pub struct FrameChannel;

impl FrameChannel {
    /// A zero-capacity channel with `senders` producer handles feeding one
    /// consumer.
    pub fn rendezvous(
        senders: usize,
        pool: FramePool,
        metrics: Arc<FlowMetrics>,
    ) -> (Vec<ChannelFrameWriter>, FrameReceiver) {
        let (tx, rx) = channel::bounded(0);

        let writers = (0..senders)
            .map(|sender_id| ChannelFrameWriter {
                sender_id,
                tx: tx.clone(),
                guard: ProtocolGuard::new("channel writer"),
                pool: pool.clone(),
                metrics: Arc::clone(&metrics),
            })
            .collect();

        (
            writers,
            FrameReceiver {
                rx,
                senders,
                pool,
                metrics,
            },
        )
    }
}
