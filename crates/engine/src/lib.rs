//! # Batch AI Engine
//!
//! Builds the job descriptor for a distributed PyTorch/Horovod run on Azure
//! Batch AI and drives the surrounding experiment lifecycle through the Azure
//! CLI: create the experiment, upload scripts, submit and monitor the job, and
//! tear resources down again.
//!
//! ## Usage
//!
//! ```rust
//! use batchai_engine::{JobDescriptorBuilder, config_from_values};
//! use indexmap::IndexMap;
//!
//! let values: IndexMap<String, String> = [
//!     ("GROUP_NAME", "batchrg"),
//!     ("FILE_SHARE_NAME", "batchshare"),
//!     ("WORKSPACE", "workspace"),
//!     ("NUM_NODES", "2"),
//!     ("CLUSTER_NAME", "gpucluster"),
//!     ("GPU_TYPE", "V100"),
//!     ("PROCESSES_PER_NODE", "4"),
//!     ("DOCKER_REPOSITORY", "masalvar"),
//! ]
//! .into_iter()
//! .map(|(key, value)| (key.to_string(), value.to_string()))
//! .collect();
//!
//! let config = config_from_values(&values)?;
//! let descriptor = JobDescriptorBuilder::new(&config).build()?;
//! assert!(descriptor.command_line().contains("mpirun -np 8"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - **`config`**: `.env` discovery, parsing, and validation into [`ExperimentConfig`]
//! - **`descriptor`**: structured command line, descriptor builder, local schema checks
//! - **`commands`**: the exact `az` argument vectors for every step
//! - **`plan`**: phase-ordered step lists for submit, monitor, and teardown
//! - **`executor`**: the [`CommandRunner`] seam, the `az` process runner, job polling
//! - **`lifecycle`**: the async driver emitting [`LifecycleEvent`]s

pub mod commands;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod plan;

pub use batchai_types::{LifecycleEvent, LifecyclePhase, RunControl, RunStatus, StepResult, StepStatus};
pub use commands::{AzInvocation, OutputMode};
pub use config::{ConfigurationError, ExperimentConfig, config_from_values, default_env_path, load_config, load_config_from_path};
pub use descriptor::{
    JobDescriptorBuilder, SchemaError, SchemaViolation, build_descriptor_from_values, read_descriptor, validate_descriptor,
    write_descriptor,
};
pub use error::{BatchAiError, ExternalCommandError, LifecycleError};
pub use executor::{AzCliRunner, CommandOutput, CommandRunner, DryRunRunner, JobState};
pub use lifecycle::{AlwaysDecline, AssumeYes, Confirmation, LifecycleReport, drive_lifecycle};
pub use plan::{
    LifecycleContext, LifecycleStep, Plan, PlanOptions, PollSpec, StepKind, TeardownScope, full_plan, monitor_plan, parse_interval,
    submit_plan, teardown_plan,
};
