//! Strongly typed model of the Batch AI job description document.
//!
//! Field names follow the camelCase spelling of the published
//! `2017-09-01-preview/job.json` schema so that serializing a [`JobDescriptor`]
//! yields a document the `az batchai job create -f` command accepts as-is.
//! Directory lists are plain `Vec`s because the schema treats them as ordered.

use serde::{Deserialize, Serialize};

/// Location of the job schema referenced by the `$schema` key.
pub const BATCHAI_JOB_SCHEMA_URL: &str = "https://raw.githubusercontent.com/Azure/BatchAI/master/schemas/2017-09-01-preview/job.json";

/// Top-level job description document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobDescriptor {
    /// Schema URL the document conforms to.
    #[serde(rename = "$schema")]
    pub schema: String,
    /// Job properties submitted to Batch AI.
    pub properties: JobProperties,
}

/// Body of the job description.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobProperties {
    /// Number of cluster nodes the job runs on.
    pub node_count: u32,
    /// Toolkit settings carrying the per-node command line.
    pub custom_toolkit_settings: CustomToolkitSettings,
    /// Mount-relative prefix where stdout/stderr are captured.
    pub std_out_err_path_prefix: String,
    /// Input mounts, exposed in the container as `$AZ_BATCHAI_INPUT_<ID>`.
    #[serde(default)]
    pub input_directories: Vec<InputDirectory>,
    /// Output mounts, exposed in the container as `$AZ_BATCHAI_OUTPUT_<ID>`.
    #[serde(default)]
    pub output_directories: Vec<OutputDirectory>,
    /// Container image the command line runs in.
    pub container_settings: ContainerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CustomToolkitSettings {
    /// Shell command executed inside each node's container.
    pub command_line: String,
}

/// Input directory mount.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InputDirectory {
    /// Identifier, upper-case by convention (`SCRIPTS`, `TRAIN`).
    pub id: String,
    /// Mount-relative path.
    pub path: String,
}

impl InputDirectory {
    pub fn new(id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
        }
    }

    /// Name of the environment variable Batch AI sets for this mount.
    pub fn environment_variable(&self) -> String {
        format!("AZ_BATCHAI_INPUT_{}", self.id)
    }
}

/// Output directory mount.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OutputDirectory {
    pub id: String,
    pub path_prefix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_suffix: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSettings {
    pub image_source_registry: ImageSourceRegistry,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageSourceRegistry {
    /// Fully qualified image reference, e.g. `masalvar/caia-horovod-pytorch`.
    pub image: String,
}

impl JobDescriptor {
    /// Returns the ids of all input directories in declaration order.
    pub fn input_directory_ids(&self) -> Vec<&str> {
        self.properties.input_directories.iter().map(|dir| dir.id.as_str()).collect()
    }

    pub fn command_line(&self) -> &str {
        &self.properties.custom_toolkit_settings.command_line
    }

    pub fn image(&self) -> &str {
        &self.properties.container_settings.image_source_registry.image
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn sample_descriptor() -> JobDescriptor {
        JobDescriptor {
            schema: BATCHAI_JOB_SCHEMA_URL.to_string(),
            properties: JobProperties {
                node_count: 2,
                custom_toolkit_settings: CustomToolkitSettings {
                    command_line: "mpirun -np 8 python -u $AZ_BATCHAI_INPUT_SCRIPTS/train.py".into(),
                },
                std_out_err_path_prefix: "$AZ_BATCHAI_MOUNT_ROOT/extfs".into(),
                input_directories: vec![InputDirectory::new("SCRIPTS", "$AZ_BATCHAI_MOUNT_ROOT/extfs/scripts")],
                output_directories: vec![OutputDirectory {
                    id: "MODEL".into(),
                    path_prefix: "$AZ_BATCHAI_MOUNT_ROOT/extfs".into(),
                    path_suffix: Some("Models".into()),
                }],
                container_settings: ContainerSettings {
                    image_source_registry: ImageSourceRegistry {
                        image: "masalvar/caia-horovod-pytorch".into(),
                    },
                },
            },
        }
    }

    #[test]
    fn serializes_with_schema_key_and_camel_case_fields() {
        let value = serde_json::to_value(sample_descriptor()).expect("serialize descriptor");

        assert_eq!(value["$schema"], json!(BATCHAI_JOB_SCHEMA_URL));
        let properties = &value["properties"];
        assert_eq!(properties["nodeCount"], json!(2));
        assert!(properties["customToolkitSettings"]["commandLine"].is_string());
        assert_eq!(properties["stdOutErrPathPrefix"], json!("$AZ_BATCHAI_MOUNT_ROOT/extfs"));
        assert_eq!(properties["inputDirectories"][0]["id"], json!("SCRIPTS"));
        assert_eq!(properties["outputDirectories"][0]["pathSuffix"], json!("Models"));
        assert_eq!(
            properties["containerSettings"]["imageSourceRegistry"]["image"],
            json!("masalvar/caia-horovod-pytorch")
        );
    }

    #[test]
    fn reparsed_document_matches_in_memory_descriptor() {
        let descriptor = sample_descriptor();
        let text = serde_json::to_string_pretty(&descriptor).expect("serialize descriptor");
        let reparsed: JobDescriptor = serde_json::from_str(&text).expect("parse descriptor");
        assert_eq!(reparsed, descriptor);
    }

    #[test]
    fn omits_missing_path_suffix() {
        let mut descriptor = sample_descriptor();
        descriptor.properties.output_directories[0].path_suffix = None;
        let value = serde_json::to_value(&descriptor).expect("serialize descriptor");
        let output = &value["properties"]["outputDirectories"][0];
        assert_eq!(output.get("pathSuffix"), None::<&Value>);
    }

    #[test]
    fn input_directory_environment_variable_uses_batchai_prefix() {
        let dir = InputDirectory::new("TRAIN", "/mnt/train");
        assert_eq!(dir.environment_variable(), "AZ_BATCHAI_INPUT_TRAIN");
    }
}
