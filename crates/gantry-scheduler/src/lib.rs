//! Pipeline scheduling and orchestration for Gantry CI.

pub mod actions;
pub mod machine;
pub mod processor;
pub mod queue;
pub mod stages;

pub use machine::{JobEvent, PipelineEvent};
pub use processor::{NewPipeline, PipelineProcessor};
pub use queue::{QueueGenerations, RunnerDispatchQueue};
