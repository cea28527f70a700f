use std::path::Path;
use std::sync::Arc;

use crate::engine::context::{TaskContext, TaskTelemetry};
use crate::engine::group::spill::FileSpillStore;
use crate::shared::config::RuntimeConfig;

/// Small frames and a tight budget by default, so tests exercise
/// flushing and spilling without large inputs.
pub struct TaskContextFactory {
    config: RuntimeConfig,
    operator: String,
}

impl TaskContextFactory {
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig {
                frame_size: 256,
                table_budget_bytes: 64 * 1024,
                spill_partitions: 4,
                merge_fan_in: 8,
                spill_dir: String::new(),
                pool_max_free: 16,
            },
            operator: "test".to_string(),
        }
    }

    pub fn with_frame_size(mut self, frame_size: usize) -> Self {
        self.config.frame_size = frame_size;
        self
    }

    pub fn with_budget(mut self, bytes: usize) -> Self {
        self.config.table_budget_bytes = bytes;
        self
    }

    pub fn with_spill_partitions(mut self, partitions: usize) -> Self {
        self.config.spill_partitions = partitions;
        self
    }

    pub fn with_fan_in(mut self, fan_in: usize) -> Self {
        self.config.merge_fan_in = fan_in;
        self
    }

    pub fn with_operator(mut self, operator: &str) -> Self {
        self.operator = operator.to_string();
        self
    }

    /// Spill files go under `dir`, normally a `tempfile::TempDir`.
    pub fn create_in(mut self, dir: &Path) -> TaskContext {
        self.config.spill_dir = dir.to_string_lossy().into_owned();
        let store = FileSpillStore::new(dir).expect("spill store opens");
        TaskContext::new(&self.config, Arc::new(store))
            .expect("context builds")
            .with_telemetry(TaskTelemetry {
                job_name: Some("test-job".to_string()),
                operator: Some(self.operator),
                partition: None,
            })
    }
}
