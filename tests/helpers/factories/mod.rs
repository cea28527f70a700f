pub mod frame_factory;
pub mod group_spec_factory;
pub mod record_factory;
pub mod task_context_factory;

pub use frame_factory::FrameFactory;
pub use group_spec_factory::GroupSpecFactory;
pub use record_factory::RecordFactory;
pub use task_context_factory::TaskContextFactory;

#[cfg(test)]
mod frame_factory_test;
