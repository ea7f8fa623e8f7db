//! Data models for experiment configuration.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Repository used for the training image when none is configured.
pub const DEFAULT_DOCKER_REPOSITORY: &str = "masalvar";
/// Image name pushed by the tutorial's Docker build.
pub const IMAGE_NAME: &str = "caia-horovod-pytorch";

/// Keys recognized in the `.env` file.
pub mod keys {
    pub const GROUP_NAME: &str = "GROUP_NAME";
    pub const FILE_SHARE_NAME: &str = "FILE_SHARE_NAME";
    pub const WORKSPACE: &str = "WORKSPACE";
    pub const NUM_NODES: &str = "NUM_NODES";
    pub const CLUSTER_NAME: &str = "CLUSTER_NAME";
    pub const GPU_TYPE: &str = "GPU_TYPE";
    pub const PROCESSES_PER_NODE: &str = "PROCESSES_PER_NODE";
    pub const USE_FAKE: &str = "USE_FAKE";
    pub const DOCKER_REPOSITORY: &str = "DOCKER_REPOSITORY";

    /// Keys that must be present and non-empty.
    pub const REQUIRED: [&str; 7] = [
        GROUP_NAME,
        FILE_SHARE_NAME,
        WORKSPACE,
        NUM_NODES,
        CLUSTER_NAME,
        GPU_TYPE,
        PROCESSES_PER_NODE,
    ];
}

/// Validated experiment settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExperimentConfig {
    /// Resource group holding the workspace.
    pub group_name: String,
    /// Azure file share the scripts are uploaded to.
    pub file_share_name: String,
    /// Batch AI workspace name.
    pub workspace: String,
    /// Cluster the job is submitted to.
    pub cluster_name: String,
    /// GPU model, e.g. `V100`. Also names the experiment.
    pub gpu_type: String,
    /// Number of nodes the job uses.
    pub num_nodes: u32,
    /// MPI ranks launched on each node.
    pub processes_per_node: u32,
    /// Train on synthetic data instead of ImageNet.
    pub use_fake: bool,
    /// Docker Hub repository hosting the training image.
    pub docker_repository: String,
}

impl ExperimentConfig {
    /// Total MPI ranks across the cluster.
    pub fn total_processes(&self) -> u64 {
        u64::from(self.num_nodes) * u64::from(self.processes_per_node)
    }

    pub fn experiment_name(&self) -> String {
        format!("distributed_pytorch_{}", self.gpu_type)
    }

    pub fn job_name(&self) -> String {
        format!("pytorch-horovod-{}", self.total_processes())
    }

    /// Fully qualified image reference for the job container.
    pub fn container_image(&self) -> String {
        format!("{}/{}", self.docker_repository, IMAGE_NAME)
    }

    /// Returns a copy with the fake-data flag replaced.
    pub fn with_fake_data(mut self, use_fake: bool) -> Self {
        self.use_fake = use_fake;
        self
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("missing required configuration key '{key}'")]
    MissingKey { key: String },

    #[error("configuration key '{key}' is empty")]
    EmptyKey { key: String },

    #[error("invalid value '{value}' for '{key}': {reason}")]
    InvalidValue { key: String, value: String, reason: String },

    #[error("no .env file found (looked for {searched})")]
    EnvFileNotFound { searched: String },

    #[error("failed to read env file {}: {source}", path.display())]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },
}

impl ConfigurationError {
    /// Key the error refers to, when there is one.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::MissingKey { key } | Self::EmptyKey { key } | Self::InvalidValue { key, .. } => Some(key),
            Self::EnvFileNotFound { .. } | Self::EnvFile { .. } => None,
        }
    }
}
