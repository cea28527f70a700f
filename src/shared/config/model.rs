use std::env;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

use crate::engine::comm::frame::MIN_FRAME_SIZE;
use crate::engine::errors::FlowError;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub runtime: RuntimeConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Frame capacity in bytes
    pub frame_size: usize,
    /// Byte budget of one in-memory aggregation table
    pub table_budget_bytes: usize,
    /// Spill partitions per aggregation table
    pub spill_partitions: usize,
    /// Maximum runs merged in one pass
    pub merge_fan_in: usize,
    pub spill_dir: String,
    /// Free frames kept by the frame pool
    pub pool_max_free: usize,
}

impl RuntimeConfig {
    pub fn validate(&self) -> Result<(), FlowError> {
        if self.frame_size < MIN_FRAME_SIZE {
            return Err(FlowError::invalid_spec(format!(
                "runtime.frame_size must be at least {}",
                MIN_FRAME_SIZE
            )));
        }
        if self.table_budget_bytes == 0 {
            return Err(FlowError::invalid_spec(
                "runtime.table_budget_bytes must be positive",
            ));
        }
        if self.spill_partitions == 0 {
            return Err(FlowError::invalid_spec(
                "runtime.spill_partitions must be positive",
            ));
        }
        if self.merge_fan_in < 2 {
            return Err(FlowError::invalid_spec(
                "runtime.merge_fan_in must be at least 2",
            ));
        }
        if self.spill_dir.is_empty() {
            return Err(FlowError::invalid_spec("runtime.spill_dir is empty"));
        }
        Ok(())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            frame_size: 32 * 1024,
            table_budget_bytes: 32 * 1024 * 1024,
            spill_partitions: 16,
            merge_fan_in: 32,
            spill_dir: default_spill_dir(),
            pool_max_free: 64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub log_dir: String,
    pub stdout_level: String,
    pub file_level: String,
}

fn default_spill_dir() -> String {
    env::temp_dir()
        .join("frameflow-spill")
        .to_string_lossy()
        .into_owned()
}

/// Builder preloaded with the built-in defaults.
pub fn settings_builder() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let runtime = RuntimeConfig::default();
    Config::builder()
        .set_default("runtime.frame_size", runtime.frame_size as i64)?
        .set_default("runtime.table_budget_bytes", runtime.table_budget_bytes as i64)?
        .set_default("runtime.spill_partitions", runtime.spill_partitions as i64)?
        .set_default("runtime.merge_fan_in", runtime.merge_fan_in as i64)?
        .set_default("runtime.spill_dir", runtime.spill_dir)?
        .set_default("runtime.pool_max_free", runtime.pool_max_free as i64)?
        .set_default("logging.log_dir", "logs")?
        .set_default("logging.stdout_level", "info")?
        .set_default("logging.file_level", "debug")
}

pub fn load_settings() -> Result<Settings, ConfigError> {
    let config_path = env::var("FRAMEFLOW_CONFIG").unwrap_or_else(|_| "config".to_string());

    let settings: Settings = settings_builder()?
        .add_source(File::with_name(&config_path).required(false))
        .add_source(
            Environment::with_prefix("FRAMEFLOW")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;

    Ok(settings)
}
