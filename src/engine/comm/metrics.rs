use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct FlowMetrics {
    total_sent_frames: AtomicU64,
    total_sent_bytes: AtomicU64,
    total_received_frames: AtomicU64,
    total_received_bytes: AtomicU64,
    fail_signals: AtomicU64,
    spilled_runs: AtomicU64,
    spilled_bytes: AtomicU64,
    merge_passes: AtomicU64,
}

impl FlowMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on_send_success(&self, bytes: u64) {
        self.total_sent_frames.fetch_add(1, Ordering::Relaxed);
        self.total_sent_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn on_receive(&self, bytes: u64) {
        self.total_received_frames.fetch_add(1, Ordering::Relaxed);
        self.total_received_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_fail(&self) {
        self.fail_signals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_spill(&self, bytes: u64) {
        self.spilled_runs.fetch_add(1, Ordering::Relaxed);
        self.spilled_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_merge_pass(&self) {
        self.merge_passes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_sent_frames(&self) -> u64 {
        self.total_sent_frames.load(Ordering::Relaxed)
    }

    pub fn total_sent_bytes(&self) -> u64 {
        self.total_sent_bytes.load(Ordering::Relaxed)
    }

    pub fn total_received_frames(&self) -> u64 {
        self.total_received_frames.load(Ordering::Relaxed)
    }

    pub fn total_received_bytes(&self) -> u64 {
        self.total_received_bytes.load(Ordering::Relaxed)
    }

    pub fn fail_signals(&self) -> u64 {
        self.fail_signals.load(Ordering::Relaxed)
    }

    pub fn spilled_runs(&self) -> u64 {
        self.spilled_runs.load(Ordering::Relaxed)
    }

    pub fn spilled_bytes(&self) -> u64 {
        self.spilled_bytes.load(Ordering::Relaxed)
    }

    pub fn merge_passes(&self) -> u64 {
        self.merge_passes.load(Ordering::Relaxed)
    }
}
