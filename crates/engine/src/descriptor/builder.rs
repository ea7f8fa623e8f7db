//! Builds the Batch AI job descriptor for the distributed PyTorch/Horovod run.

use std::fs;
use std::path::Path;

use batchai_types::{
    BATCHAI_JOB_SCHEMA_URL, ContainerSettings, CustomToolkitSettings, ImageSourceRegistry, InputDirectory, JobDescriptor,
    JobProperties, OutputDirectory,
};
use indexmap::IndexMap;
use tracing::{debug, info};

use super::command_line::{CommandLine, MpiArg, MpiRunCommand, ShellCommand, ShellWord};
use super::validation::{SchemaError, collect_document_violations, validate_descriptor};
use crate::config::{ExperimentConfig, config_from_values};
use crate::error::BatchAiError;

/// Training entry point, relative to the scripts input directory.
pub const TRAINING_SCRIPT: &str = "imagenet_pytorch_horovod.py";

/// Job-relative output prefix for stdout/stderr and the model directory.
pub const EXTFS_ROOT: &str = "$AZ_BATCHAI_MOUNT_ROOT/extfs";
const SCRIPTS_PATH: &str = "$AZ_BATCHAI_MOUNT_ROOT/extfs/scripts";
const IMAGENET_PATH: &str = "$AZ_BATCHAI_MOUNT_ROOT/nfs/imagenet";

const HOST_LIST_VAR: &str = "AZ_BATCH_HOST_LIST";
const HOST_FILE_VAR: &str = "AZ_BATCHAI_MPI_HOST_FILE";

/// Builds a [`JobDescriptor`] from a validated configuration.
pub struct JobDescriptorBuilder<'a> {
    config: &'a ExperimentConfig,
}

impl<'a> JobDescriptorBuilder<'a> {
    pub fn new(config: &'a ExperimentConfig) -> Self {
        Self { config }
    }

    /// Input mounts in the order the job declares them.
    pub fn input_directories(&self) -> Vec<InputDirectory> {
        vec![
            InputDirectory::new("SCRIPTS", SCRIPTS_PATH),
            InputDirectory::new("TRAIN", IMAGENET_PATH),
            InputDirectory::new("TEST", IMAGENET_PATH),
        ]
    }

    pub fn output_directories(&self) -> Vec<OutputDirectory> {
        vec![OutputDirectory {
            id: "MODEL".into(),
            path_prefix: EXTFS_ROOT.into(),
            path_suffix: Some("Models".into()),
        }]
    }

    /// The `mpirun` launch with its fixed NCCL/OpenMPI tuning.
    pub fn mpirun(&self) -> MpiRunCommand {
        let training = ShellCommand::new("python")
            .literal("-u")
            .word(ShellWord::variable_path("AZ_BATCHAI_INPUT_SCRIPTS", TRAINING_SCRIPT));

        MpiRunCommand::new(training)
            .arg(MpiArg::Processes(self.config.total_processes()))
            .arg(MpiArg::HostFile {
                variable: HOST_FILE_VAR.into(),
            })
            .arg(MpiArg::option("-bind-to", "none"))
            .arg(MpiArg::option("-map-by", "slot"))
            .arg(MpiArg::export_value("NCCL_DEBUG", "INFO"))
            .arg(MpiArg::export("LD_LIBRARY_PATH"))
            .arg(MpiArg::mca("btl_tcp_if_include", "eth0"))
            .arg(MpiArg::export_value("NCCL_SOCKET_IFNAME", "eth0"))
            .arg(MpiArg::mca("btl", "^openib"))
            .arg(MpiArg::export_value("NCCL_IB_DISABLE", "1"))
            .arg(MpiArg::export_value("DISTRIBUTED", "True"))
            .arg(MpiArg::export("AZ_BATCHAI_INPUT_TRAIN"))
            .arg(MpiArg::export("AZ_BATCHAI_INPUT_TEST"))
            .arg(MpiArg::switch("--allow-run-as-root"))
            .arg_if(self.config.use_fake, MpiArg::env("FAKE", "True"))
    }

    pub fn command_line(&self) -> CommandLine {
        CommandLine::new()
            .then(ShellCommand::new("echo").variable(HOST_LIST_VAR))
            .then(ShellCommand::new("cat").variable(HOST_FILE_VAR))
            .then(self.mpirun().to_shell_command())
    }

    /// Assemble and validate the descriptor.
    pub fn build(&self) -> Result<JobDescriptor, SchemaError> {
        let command_line = self.command_line().render();
        let descriptor = JobDescriptor {
            schema: BATCHAI_JOB_SCHEMA_URL.to_string(),
            properties: JobProperties {
                node_count: self.config.num_nodes,
                custom_toolkit_settings: CustomToolkitSettings { command_line },
                std_out_err_path_prefix: EXTFS_ROOT.to_string(),
                input_directories: self.input_directories(),
                output_directories: self.output_directories(),
                container_settings: ContainerSettings {
                    image_source_registry: ImageSourceRegistry {
                        image: self.config.container_image(),
                    },
                },
            },
        };

        validate_descriptor(&descriptor, Some(self.config.total_processes()))?;
        debug!(
            node_count = descriptor.properties.node_count,
            processes = self.config.total_processes(),
            fake = self.config.use_fake,
            "built job descriptor"
        );
        Ok(descriptor)
    }
}

/// Validate raw configuration values and build the descriptor in one go.
pub fn build_descriptor_from_values(values: &IndexMap<String, String>) -> Result<JobDescriptor, BatchAiError> {
    let config = config_from_values(values)?;
    Ok(JobDescriptorBuilder::new(&config).build()?)
}

/// Write the descriptor as pretty-printed JSON, creating parent directories.
pub fn write_descriptor(descriptor: &JobDescriptor, path: &Path) -> Result<(), BatchAiError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| BatchAiError::io(parent, source))?;
    }
    let mut contents = serde_json::to_string_pretty(descriptor)?;
    contents.push('\n');
    fs::write(path, contents).map_err(|source| BatchAiError::io(path, source))?;
    info!(path = %path.display(), "wrote job descriptor");
    Ok(())
}

/// Read a descriptor file, checking its document shape and invariants.
pub fn read_descriptor(path: &Path) -> Result<JobDescriptor, BatchAiError> {
    let contents = fs::read_to_string(path).map_err(|source| BatchAiError::io(path, source))?;
    let document: serde_json::Value = serde_json::from_str(&contents)?;

    let violations = collect_document_violations(&document);
    if !violations.is_empty() {
        return Err(SchemaError { violations }.into());
    }

    let descriptor: JobDescriptor = serde_json::from_value(document)?;
    validate_descriptor(&descriptor, None)?;
    Ok(descriptor)
}
