use std::fmt;

use tracing::warn;

use crate::engine::errors::FlowError;

/// Push-based lifecycle implemented by every pipeline stage:
/// `open → next_frame* → (fail)? → close`.
///
/// `close` must be invoked exactly once on every exit path, including
/// after `fail`. A second `close` is a no-op. Frames passed to
/// `next_frame` are only borrowed for the duration of the call.
pub trait FrameWriter: Send {
    fn open(&mut self) -> Result<(), FlowError>;

    fn next_frame(&mut self, frame: &[u8]) -> Result<(), FlowError>;

    /// Signals an upstream failure. Implementations forward it to all of
    /// their own downstream writers before returning.
    fn fail(&mut self) -> Result<(), FlowError>;

    fn close(&mut self) -> Result<(), FlowError>;
}

impl<W: FrameWriter + ?Sized> FrameWriter for Box<W> {
    fn open(&mut self) -> Result<(), FlowError> {
        (**self).open()
    }

    fn next_frame(&mut self, frame: &[u8]) -> Result<(), FlowError> {
        (**self).next_frame(frame)
    }

    fn fail(&mut self) -> Result<(), FlowError> {
        (**self).fail()
    }

    fn close(&mut self) -> Result<(), FlowError> {
        (**self).close()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Unopened,
    Open,
    Failed,
    Closed,
}

impl fmt::Display for WriterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WriterState::Unopened => "unopened",
            WriterState::Open => "open",
            WriterState::Failed => "failed",
            WriterState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Tracks a writer's protocol state and rejects illegal transitions.
#[derive(Debug, Clone)]
pub struct ProtocolGuard {
    name: &'static str,
    state: WriterState,
}

impl ProtocolGuard {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: WriterState::Unopened,
        }
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    pub fn on_open(&mut self) -> Result<(), FlowError> {
        match self.state {
            WriterState::Unopened => {
                self.state = WriterState::Open;
                Ok(())
            }
            other => Err(FlowError::usage(format!(
                "{}: open() called while {}",
                self.name, other
            ))),
        }
    }

    pub fn on_next_frame(&self) -> Result<(), FlowError> {
        match self.state {
            WriterState::Open => Ok(()),
            other => Err(FlowError::usage(format!(
                "{}: next_frame() called while {}",
                self.name, other
            ))),
        }
    }

    /// Returns `true` when the failure is new and must be propagated.
    pub fn on_fail(&mut self) -> bool {
        match self.state {
            WriterState::Unopened | WriterState::Open => {
                self.state = WriterState::Failed;
                true
            }
            WriterState::Failed | WriterState::Closed => false,
        }
    }

    /// Returns the state being left, or `None` if already closed.
    pub fn on_close(&mut self) -> Option<WriterState> {
        match self.state {
            WriterState::Closed => None,
            previous => {
                self.state = WriterState::Closed;
                Some(previous)
            }
        }
    }
}

/// Runs `body` between `open` and `close` of `writer`.
///
/// If opening or the body fails, the writer is failed and closed and the
/// original error is returned; a secondary error from `fail` or `close`
/// is logged instead of replacing it.
pub fn drive<W, F>(writer: &mut W, body: F) -> Result<(), FlowError>
where
    W: FrameWriter + ?Sized,
    F: FnOnce(&mut W) -> Result<(), FlowError>,
{
    let outcome = writer.open().and_then(|()| body(writer));
    match outcome {
        Ok(()) => writer.close(),
        Err(err) => {
            if let Err(fail_err) = writer.fail() {
                warn!(target: "frameflow::writer", error = %fail_err, "fail() raised during cleanup");
            }
            if let Err(close_err) = writer.close() {
                warn!(target: "frameflow::writer", error = %close_err, "close() raised during cleanup");
            }
            Err(err)
        }
    }
}
