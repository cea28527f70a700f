pub use super::factories::{FrameFactory, GroupSpecFactory, RecordFactory, TaskContextFactory};
pub use super::writers::RecordingWriter;

pub struct Factory;

impl Factory {
    pub fn record() -> RecordFactory {
        RecordFactory::new()
    }

    pub fn frames() -> FrameFactory {
        FrameFactory::new()
    }

    pub fn group_spec() -> GroupSpecFactory {
        GroupSpecFactory::new()
    }

    pub fn context() -> TaskContextFactory {
        TaskContextFactory::new()
    }

    pub fn recording_writer() -> RecordingWriter {
        RecordingWriter::new()
    }
}
