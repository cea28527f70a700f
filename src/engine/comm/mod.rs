mod accessor;
mod appender;
mod channel;
pub mod frame;
mod metrics;
mod pool;
mod tuple_builder;
mod writer;

pub use accessor::FrameTupleAccessor;
pub use appender::FrameTupleAppender;
pub use channel::{ChannelFrameWriter, FrameChannel, FrameMessage, FrameReceiver};
pub use frame::DEFAULT_FRAME_SIZE;
pub use metrics::FlowMetrics;
pub use pool::FramePool;
pub use tuple_builder::TupleBuilder;
pub use writer::{FrameWriter, ProtocolGuard, WriterState, drive};
