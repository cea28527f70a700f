use std::io;
use thiserror::Error;
use tracing::{debug, error};

/// Failures raised by the frame transport, exchange and grouping layers.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("record needs {required} bytes but an empty frame holds {capacity}")]
    OversizeRecord { required: usize, capacity: usize },

    #[error("I/O failure: {0}")]
    Io(#[from] io::Error),

    #[error("frame writer protocol violation: {0}")]
    Usage(String),

    #[error("downstream channel closed")]
    ChannelClosed,

    #[error("upstream producer failed")]
    UpstreamFailed,

    #[error("invalid operator spec: {0}")]
    InvalidSpec(String),

    #[error("operator error: {0}")]
    Operator(String),
}

impl FlowError {
    pub fn usage<S: Into<String>>(message: S) -> Self {
        Self::Usage(message.into())
    }

    pub fn invalid_spec<S: Into<String>>(message: S) -> Self {
        Self::InvalidSpec(message.into())
    }

    pub fn operator<S: Into<String>>(message: S) -> Self {
        Self::Operator(message.into())
    }

    pub fn invalid_data<S: Into<String>>(message: S) -> Self {
        Self::Io(io::Error::new(io::ErrorKind::InvalidData, message.into()))
    }

    /// Secondary failures are consequences of another partition failing:
    /// a consumer hanging up, or a producer signalling `fail()`.
    pub fn is_root_cause(&self) -> bool {
        !matches!(self, FlowError::ChannelClosed | FlowError::UpstreamFailed)
    }

    pub fn log_error(&self) {
        match self {
            FlowError::OversizeRecord { required, capacity } => {
                error!(
                    target: "frameflow::errors",
                    required, capacity, "Record exceeds frame capacity"
                );
            }
            FlowError::Io(e) => {
                error!(target: "frameflow::errors", "I/O failure: {}", e);
                debug!(target: "frameflow::errors", "I/O failure details: {:?}", e);
            }
            FlowError::Usage(msg) => {
                error!(target: "frameflow::errors", "Protocol violation: {}", msg);
            }
            FlowError::ChannelClosed => {
                error!(target: "frameflow::errors", "Downstream channel closed");
                debug!(target: "frameflow::errors", "Consumer hung up before the producer closed");
            }
            FlowError::UpstreamFailed => {
                error!(target: "frameflow::errors", "Upstream producer failed");
            }
            FlowError::InvalidSpec(msg) => {
                error!(target: "frameflow::errors", "Invalid operator spec: {}", msg);
            }
            FlowError::Operator(msg) => {
                error!(target: "frameflow::errors", "Operator error: {}", msg);
            }
        }
    }
}

/// Picks the error a job should report: the first root cause if any,
/// otherwise the first secondary failure.
pub fn first_root_cause<I>(errors: I) -> Option<FlowError>
where
    I: IntoIterator<Item = FlowError>,
{
    let mut secondary = None;
    for err in errors {
        if err.is_root_cause() {
            return Some(err);
        }
        if secondary.is_none() {
            secondary = Some(err);
        }
    }
    secondary
}
