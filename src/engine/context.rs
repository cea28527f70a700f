use std::sync::Arc;

use crate::engine::comm::{FlowMetrics, FramePool};
use crate::engine::errors::FlowError;
use crate::engine::group::spill::{FileSpillStore, SpillStore};
use crate::shared::config::RuntimeConfig;

/// Identifies the operator partition a context belongs to, for logs and
/// spill file names.
#[derive(Debug, Clone, Default)]
pub struct TaskTelemetry {
    pub job_name: Option<String>,
    pub operator: Option<String>,
    pub partition: Option<usize>,
}

impl TaskTelemetry {
    pub fn label(&self) -> String {
        let job = self.job_name.as_deref().unwrap_or("job");
        let operator = self.operator.as_deref().unwrap_or("task");
        match self.partition {
            Some(p) => format!("{}.{}.{}", job, operator, p),
            None => format!("{}.{}", job, operator),
        }
    }
}

/// Everything an operator needs from its environment, injected at
/// construction: frame sizing, the shared frame pool and metrics, spill
/// storage and grouping limits.
///
/// Clones share the pool, metrics and spill store.
#[derive(Debug, Clone)]
pub struct TaskContext {
    frame_size: usize,
    pool: FramePool,
    metrics: Arc<FlowMetrics>,
    spill_store: Arc<dyn SpillStore>,
    table_budget_bytes: usize,
    spill_partitions: usize,
    merge_fan_in: usize,
    telemetry: TaskTelemetry,
}

impl TaskContext {
    pub fn new(config: &RuntimeConfig, spill_store: Arc<dyn SpillStore>) -> Result<Self, FlowError> {
        config.validate()?;
        let pool = FramePool::new(config.frame_size, config.pool_max_free)?;

        Ok(Self {
            frame_size: config.frame_size,
            pool,
            metrics: FlowMetrics::new(),
            spill_store,
            table_budget_bytes: config.table_budget_bytes,
            spill_partitions: config.spill_partitions,
            merge_fan_in: config.merge_fan_in,
            telemetry: TaskTelemetry::default(),
        })
    }

    /// Spills to files under `config.spill_dir`.
    pub fn from_config(config: &RuntimeConfig) -> Result<Self, FlowError> {
        let store = FileSpillStore::new(&config.spill_dir)?;
        Self::new(config, Arc::new(store))
    }

    pub fn with_telemetry(mut self, telemetry: TaskTelemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// A context for one partition of `operator`, sharing this context's
    /// resources.
    pub fn for_partition(&self, operator: &str, partition: usize) -> Self {
        let mut ctx = self.clone();
        ctx.telemetry.operator = Some(operator.to_string());
        ctx.telemetry.partition = Some(partition);
        ctx
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn pool(&self) -> &FramePool {
        &self.pool
    }

    pub fn metrics(&self) -> &Arc<FlowMetrics> {
        &self.metrics
    }

    pub fn spill_store(&self) -> &Arc<dyn SpillStore> {
        &self.spill_store
    }

    pub fn table_budget_bytes(&self) -> usize {
        self.table_budget_bytes
    }

    pub fn spill_partitions(&self) -> usize {
        self.spill_partitions
    }

    pub fn merge_fan_in(&self) -> usize {
        self.merge_fan_in
    }

    pub fn telemetry(&self) -> &TaskTelemetry {
        &self.telemetry
    }
}
