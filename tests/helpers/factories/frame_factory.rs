use crate::engine::comm::{DEFAULT_FRAME_SIZE, FrameTupleAppender, FrameWriter, TupleBuilder};
use crate::engine::data::{FieldValue, RecordDescriptor};
use crate::test_helpers::writers::RecordingWriter;

use super::RecordFactory;

/// Packs rows into frames the way a producer would.
pub struct FrameFactory {
    record: RecordDescriptor,
    frame_size: usize,
    rows: Vec<Vec<FieldValue>>,
}

impl FrameFactory {
    pub fn new() -> Self {
        Self {
            record: RecordFactory::new().create(),
            frame_size: DEFAULT_FRAME_SIZE,
            rows: Vec::new(),
        }
    }

    pub fn with_record(mut self, record: RecordDescriptor) -> Self {
        self.record = record;
        self
    }

    pub fn with_frame_size(mut self, frame_size: usize) -> Self {
        self.frame_size = frame_size;
        self
    }

    pub fn with_rows(mut self, rows: Vec<Vec<FieldValue>>) -> Self {
        self.rows = rows;
        self
    }

    /// `(key, value)` rows for the default `(int32, int64)` record.
    pub fn with_pairs<I>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (i32, i64)>,
    {
        self.rows = pairs
            .into_iter()
            .map(|(k, v)| vec![FieldValue::Int32(k), FieldValue::Int64(v)])
            .collect();
        self
    }

    pub fn record(&self) -> &RecordDescriptor {
        &self.record
    }

    pub fn create_frames(self) -> Vec<Vec<u8>> {
        let mut sink = RecordingWriter::new();
        let mut appender = FrameTupleAppender::new(self.frame_size);
        let mut builder = TupleBuilder::new();

        sink.open().expect("sink opens");
        for row in &self.rows {
            self.record
                .serialize_row(row, &mut builder)
                .expect("row matches record");
            appender
                .append_builder_to_writer(&mut sink, &builder)
                .expect("row fits in a frame");
        }
        appender.flush(&mut sink, false).expect("flush succeeds");
        sink.close().expect("sink closes");
        sink.frames()
    }

    /// All rows in a single frame; panics if they need more than one.
    pub fn create(self) -> Vec<u8> {
        let frame_size = self.frame_size;
        let mut frames = self.create_frames();
        assert!(frames.len() <= 1, "rows span {} frames", frames.len());
        frames.pop().unwrap_or_else(|| vec![0u8; frame_size])
    }
}
