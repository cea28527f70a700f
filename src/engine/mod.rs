pub mod comm;
pub mod context;
pub mod data;
pub mod errors;
pub mod group;
pub mod partition;
pub mod pipeline;

pub use errors::*;

#[cfg(test)]
mod pipeline_test;
