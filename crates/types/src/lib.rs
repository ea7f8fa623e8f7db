//! Shared type definitions for the Batch AI orchestration workspace.
//!
//! - [`job`]: the serde model of the Batch AI Job Descriptor document.
//! - [`lifecycle`]: step results, run statuses, and the events streamed while
//!   an experiment lifecycle plan executes.

pub mod job;
pub mod lifecycle;

pub use job::{
    BATCHAI_JOB_SCHEMA_URL, ContainerSettings, CustomToolkitSettings, ImageSourceRegistry, InputDirectory, JobDescriptor,
    JobProperties, OutputDirectory,
};
pub use lifecycle::{LifecycleEvent, LifecyclePhase, RunControl, RunStatus, StepResult, StepStatus};
