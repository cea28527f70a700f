pub mod global;
pub mod model;

pub use global::CONFIG;
pub use model::{LoggingConfig, RuntimeConfig, Settings, load_settings, settings_builder};

#[cfg(test)]
mod model_test;
