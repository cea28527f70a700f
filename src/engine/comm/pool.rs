use std::sync::Arc;

use parking_lot::Mutex;

use crate::engine::errors::FlowError;

use super::frame::MIN_FRAME_SIZE;

/// Recycles fixed-size frame buffers between appenders and channels.
#[derive(Debug, Clone)]
pub struct FramePool {
    inner: Arc<FramePoolInner>,
}

#[derive(Debug)]
struct FramePoolInner {
    frame_size: usize,
    max_free: usize,
    free: Mutex<Vec<Vec<u8>>>,
}

impl FramePool {
    pub fn new(frame_size: usize, max_free: usize) -> Result<Self, FlowError> {
        if frame_size < MIN_FRAME_SIZE {
            return Err(FlowError::invalid_spec(format!(
                "frame size must be at least {} bytes, got {}",
                MIN_FRAME_SIZE, frame_size
            )));
        }

        Ok(Self {
            inner: Arc::new(FramePoolInner {
                frame_size,
                max_free,
                free: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn frame_size(&self) -> usize {
        self.inner.frame_size
    }

    /// A zeroed frame, reading back as empty.
    pub fn acquire(&self) -> Vec<u8> {
        let reused = self.inner.free.lock().pop();
        match reused {
            Some(mut frame) => {
                frame.fill(0);
                frame
            }
            None => vec![0u8; self.inner.frame_size],
        }
    }

    /// A pooled buffer holding a copy of `bytes`.
    pub fn acquire_copy(&self, bytes: &[u8]) -> Vec<u8> {
        if bytes.len() != self.inner.frame_size {
            return bytes.to_vec();
        }
        let reused = self.inner.free.lock().pop();
        match reused {
            Some(mut frame) => {
                frame.copy_from_slice(bytes);
                frame
            }
            None => bytes.to_vec(),
        }
    }

    pub fn recycle(&self, frame: Vec<u8>) {
        if frame.len() != self.inner.frame_size {
            return;
        }
        let mut free = self.inner.free.lock();
        if free.len() < self.inner.max_free {
            free.push(frame);
        }
    }

    pub fn free_frames(&self) -> usize {
        self.inner.free.lock().len()
    }
}
