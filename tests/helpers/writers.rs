use std::sync::Arc;

use parking_lot::Mutex;

use crate::engine::comm::{FrameTupleAccessor, FrameWriter, ProtocolGuard};
use crate::engine::data::{FieldValue, RecordDescriptor};
use crate::engine::errors::FlowError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriterEvent {
    Open,
    Frame(Vec<u8>),
    Fail,
    Close,
}

#[derive(Debug)]
struct RecorderState {
    events: Vec<WriterEvent>,
    guard: ProtocolGuard,
    frames_seen: usize,
}

/// Test double that records every protocol call it receives.
///
/// Clones share the same log, so a test can hand one clone to the code
/// under test and inspect the other afterwards. Protocol violations
/// (`next_frame` before `open`, double `open`) are returned as errors.
#[derive(Debug, Clone)]
pub struct RecordingWriter {
    state: Arc<Mutex<RecorderState>>,
    fail_on_open: bool,
    fail_on_frame: Option<usize>,
    fail_on_close: bool,
}

impl RecordingWriter {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RecorderState {
                events: Vec::new(),
                guard: ProtocolGuard::new("recording writer"),
                frames_seen: 0,
            })),
            fail_on_open: false,
            fail_on_frame: None,
            fail_on_close: false,
        }
    }

    pub fn failing_on_open(mut self) -> Self {
        self.fail_on_open = true;
        self
    }

    /// Rejects the `n`th frame (zero based) with an operator error.
    pub fn failing_on_frame(mut self, n: usize) -> Self {
        self.fail_on_frame = Some(n);
        self
    }

    pub fn failing_on_close(mut self) -> Self {
        self.fail_on_close = true;
        self
    }

    pub fn events(&self) -> Vec<WriterEvent> {
        self.state.lock().events.clone()
    }

    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|e| match e {
                WriterEvent::Frame(bytes) => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn opens(&self) -> usize {
        self.count(|e| matches!(e, WriterEvent::Open))
    }

    pub fn fails(&self) -> usize {
        self.count(|e| matches!(e, WriterEvent::Fail))
    }

    pub fn closes(&self) -> usize {
        self.count(|e| matches!(e, WriterEvent::Close))
    }

    pub fn tuple_count(&self, field_count: usize) -> usize {
        self.frames()
            .iter()
            .map(|f| FrameTupleAccessor::new(field_count, f).tuple_count())
            .sum()
    }

    pub fn rows(&self, record: &RecordDescriptor) -> Vec<Vec<FieldValue>> {
        self.frames()
            .iter()
            .flat_map(|f| record.decode_frame(f).expect("recorded frame decodes"))
            .collect()
    }

    fn count(&self, pred: impl Fn(&WriterEvent) -> bool) -> usize {
        self.state.lock().events.iter().filter(|e| pred(e)).count()
    }
}

impl FrameWriter for RecordingWriter {
    fn open(&mut self) -> Result<(), FlowError> {
        let mut state = self.state.lock();
        state.events.push(WriterEvent::Open);
        state.guard.on_open()?;
        if self.fail_on_open {
            return Err(FlowError::operator("open rejected"));
        }
        Ok(())
    }

    fn next_frame(&mut self, frame: &[u8]) -> Result<(), FlowError> {
        let mut state = self.state.lock();
        state.guard.on_next_frame()?;
        let seen = state.frames_seen;
        state.frames_seen += 1;
        if self.fail_on_frame == Some(seen) {
            return Err(FlowError::operator(format!("frame {} rejected", seen)));
        }
        state.events.push(WriterEvent::Frame(frame.to_vec()));
        Ok(())
    }

    fn fail(&mut self) -> Result<(), FlowError> {
        let mut state = self.state.lock();
        state.events.push(WriterEvent::Fail);
        state.guard.on_fail();
        Ok(())
    }

    fn close(&mut self) -> Result<(), FlowError> {
        let mut state = self.state.lock();
        state.events.push(WriterEvent::Close);
        state.guard.on_close();
        if self.fail_on_close {
            return Err(FlowError::operator("close rejected"));
        }
        Ok(())
    }
}
