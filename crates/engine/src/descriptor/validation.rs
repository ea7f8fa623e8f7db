//! Local validation of job descriptors before submission.
//!
//! `az batchai job create` only reports schema problems after a round trip to
//! the service, and some mistakes (a command line that references an input
//! mount the descriptor never declares) are not caught there at all. These
//! checks run against the in-memory descriptor and, for files read from disk,
//! against the raw JSON document.

use std::collections::HashSet;
use std::fmt;

use batchai_types::JobDescriptor;
use batchai_util::lex_shell_like;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

static DIRECTORY_ID_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z0-9_]+$").expect("directory id regex should compile"));

static INPUT_REFERENCE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"AZ_BATCHAI_INPUT_([A-Za-z0-9_]+)").expect("input reference regex should compile"));

/// A single descriptor rule violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    /// JSON path of the offending field.
    pub path: String,
    /// Stable rule identifier.
    pub rule: String,
    pub message: String,
}

impl SchemaViolation {
    pub fn new(path: impl Into<String>, rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            rule: rule.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.path, self.rule, self.message)
    }
}

/// Raised when a descriptor fails validation.
#[derive(Debug, Error)]
#[error("job descriptor failed validation: {}", summarize(.violations))]
pub struct SchemaError {
    pub violations: Vec<SchemaViolation>,
}

impl SchemaError {
    pub fn has_rule(&self, rule: &str) -> bool {
        self.violations.iter().any(|violation| violation.rule == rule)
    }
}

fn summarize(violations: &[SchemaViolation]) -> String {
    violations.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// Checks the raw document shape: `$schema` and `properties` must be present.
pub fn collect_document_violations(document: &Value) -> Vec<SchemaViolation> {
    let mut violations = Vec::new();
    match document.get("$schema") {
        Some(Value::String(url)) if url.ends_with("job.json") => {}
        Some(Value::String(url)) => violations.push(SchemaViolation::new(
            "$.$schema",
            "schema_url",
            format!("'{url}' does not reference a Batch AI job schema"),
        )),
        Some(_) => violations.push(SchemaViolation::new("$.$schema", "schema_url", "`$schema` must be a string")),
        None => violations.push(SchemaViolation::new("$.$schema", "schema_url", "missing required `$schema` key")),
    }
    match document.get("properties") {
        Some(Value::Object(_)) => {}
        Some(_) => violations.push(SchemaViolation::new("$.properties", "properties_type", "`properties` must be an object")),
        None => violations.push(SchemaViolation::new("$.properties", "properties_required", "missing required `properties` object")),
    }
    violations
}

/// Collects every rule violation in `descriptor`.
///
/// When `expected_processes` is given the `-np` count must match it exactly;
/// otherwise it must be a positive multiple of `nodeCount`.
pub fn collect_descriptor_violations(descriptor: &JobDescriptor, expected_processes: Option<u64>) -> Vec<SchemaViolation> {
    let mut violations = Vec::new();
    let properties = &descriptor.properties;

    if !descriptor.schema.ends_with("job.json") {
        violations.push(SchemaViolation::new(
            "$.$schema",
            "schema_url",
            format!("'{}' does not reference a Batch AI job schema", descriptor.schema),
        ));
    }

    if properties.node_count == 0 {
        violations.push(SchemaViolation::new("$.properties.nodeCount", "node_count", "nodeCount must be at least 1"));
    }

    if properties.std_out_err_path_prefix.trim().is_empty() {
        violations.push(SchemaViolation::new(
            "$.properties.stdOutErrPathPrefix",
            "std_out_err_path_prefix",
            "stdOutErrPathPrefix must not be empty",
        ));
    }

    check_directory_ids(
        properties.input_directories.iter().map(|dir| (dir.id.as_str(), dir.path.as_str())),
        "$.properties.inputDirectories",
        &mut violations,
    );
    check_directory_ids(
        properties
            .output_directories
            .iter()
            .map(|dir| (dir.id.as_str(), dir.path_prefix.as_str())),
        "$.properties.outputDirectories",
        &mut violations,
    );

    let command_line = descriptor.command_line();
    if command_line.trim().is_empty() {
        violations.push(SchemaViolation::new(
            "$.properties.customToolkitSettings.commandLine",
            "command_line",
            "commandLine must not be empty",
        ));
    } else {
        check_process_count(command_line, properties.node_count, expected_processes, &mut violations);
        check_input_references(descriptor, &mut violations);
    }

    let image = descriptor.image();
    if image.trim().is_empty() || image.chars().any(char::is_whitespace) {
        violations.push(SchemaViolation::new(
            "$.properties.containerSettings.imageSourceRegistry.image",
            "image",
            format!("'{image}' is not a valid image reference"),
        ));
    }

    violations
}

/// Returns `Ok(())` when the descriptor passes every rule.
pub fn validate_descriptor(descriptor: &JobDescriptor, expected_processes: Option<u64>) -> Result<(), SchemaError> {
    let violations = collect_descriptor_violations(descriptor, expected_processes);
    if violations.is_empty() {
        return Ok(());
    }
    Err(SchemaError { violations })
}

/// Input directory ids referenced from the command line, in first-seen order.
pub fn referenced_input_ids(command_line: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    INPUT_REFERENCE_REGEX
        .captures_iter(command_line)
        .map(|caps| caps[1].to_string())
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

/// Value following the first `-np` token of the `mpirun` command.
pub fn embedded_process_count(command_line: &str) -> Option<u64> {
    let tokens = lex_shell_like(command_line);
    let position = tokens.iter().position(|token| token == "-np")?;
    tokens.get(position + 1)?.parse().ok()
}

fn check_directory_ids<'a>(
    directories: impl Iterator<Item = (&'a str, &'a str)>,
    path: &str,
    violations: &mut Vec<SchemaViolation>,
) {
    let mut seen = HashSet::new();
    for (index, (id, location)) in directories.enumerate() {
        if !DIRECTORY_ID_REGEX.is_match(id) {
            violations.push(SchemaViolation::new(
                format!("{path}[{index}].id"),
                "directory_id",
                format!("directory id '{id}' must be upper-case letters, digits, or underscores"),
            ));
        }
        if !seen.insert(id) {
            violations.push(SchemaViolation::new(
                format!("{path}[{index}].id"),
                "duplicate_directory_id",
                format!("directory id '{id}' is declared more than once"),
            ));
        }
        if location.trim().is_empty() {
            violations.push(SchemaViolation::new(
                format!("{path}[{index}]"),
                "directory_path",
                format!("directory '{id}' has an empty path"),
            ));
        }
    }
}

fn check_process_count(command_line: &str, node_count: u32, expected: Option<u64>, violations: &mut Vec<SchemaViolation>) {
    let path = "$.properties.customToolkitSettings.commandLine";
    let Some(embedded) = embedded_process_count(command_line) else {
        violations.push(SchemaViolation::new(
            path,
            "process_count",
            "commandLine does not contain an `mpirun -np <count>` process count",
        ));
        return;
    };

    match expected {
        Some(expected) if embedded != expected => violations.push(SchemaViolation::new(
            path,
            "process_count",
            format!("commandLine launches {embedded} processes but nodeCount x processesPerNode is {expected}"),
        )),
        Some(_) => {}
        None => {
            let nodes = u64::from(node_count);
            if nodes > 0 && (embedded < nodes || embedded % nodes != 0) {
                violations.push(SchemaViolation::new(
                    path,
                    "process_count",
                    format!("commandLine launches {embedded} processes, not a positive multiple of nodeCount {node_count}"),
                ));
            }
        }
    }
}

fn check_input_references(descriptor: &JobDescriptor, violations: &mut Vec<SchemaViolation>) {
    let declared: HashSet<&str> = descriptor.input_directory_ids().into_iter().collect();
    for id in referenced_input_ids(descriptor.command_line()) {
        if !declared.contains(id.as_str()) {
            violations.push(SchemaViolation::new(
                "$.properties.customToolkitSettings.commandLine",
                "unknown_input_directory",
                format!("commandLine references AZ_BATCHAI_INPUT_{id} but no input directory '{id}' is declared"),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchai_types::{
        BATCHAI_JOB_SCHEMA_URL, ContainerSettings, CustomToolkitSettings, ImageSourceRegistry, InputDirectory, JobProperties,
        OutputDirectory,
    };
    use serde_json::json;

    fn descriptor(command_line: &str) -> JobDescriptor {
        JobDescriptor {
            schema: BATCHAI_JOB_SCHEMA_URL.into(),
            properties: JobProperties {
                node_count: 2,
                custom_toolkit_settings: CustomToolkitSettings {
                    command_line: command_line.into(),
                },
                std_out_err_path_prefix: "$AZ_BATCHAI_MOUNT_ROOT/extfs".into(),
                input_directories: vec![
                    InputDirectory::new("SCRIPTS", "$AZ_BATCHAI_MOUNT_ROOT/extfs/scripts"),
                    InputDirectory::new("TRAIN", "$AZ_BATCHAI_MOUNT_ROOT/nfs/imagenet"),
                ],
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
    fn accepts_consistent_descriptor() {
        let descriptor = descriptor("mpirun -np 8 -x AZ_BATCHAI_INPUT_TRAIN python $AZ_BATCHAI_INPUT_SCRIPTS/train.py");
        assert!(validate_descriptor(&descriptor, Some(8)).is_ok());
        assert!(validate_descriptor(&descriptor, None).is_ok());
    }

    #[test]
    fn flags_undeclared_input_reference() {
        let descriptor = descriptor("mpirun -np 8 -x AZ_BATCHAI_INPUT_TEST python $AZ_BATCHAI_INPUT_SCRIPTS/train.py");
        let error = validate_descriptor(&descriptor, Some(8)).expect_err("TEST is not declared");
        assert!(error.has_rule("unknown_input_directory"));
        assert!(error.to_string().contains("AZ_BATCHAI_INPUT_TEST"));
    }

    #[test]
    fn flags_process_count_mismatch() {
        let descriptor = descriptor("mpirun -np 6 python train.py");
        let error = validate_descriptor(&descriptor, Some(8)).expect_err("mismatch");
        assert!(error.has_rule("process_count"));
    }

    #[test]
    fn process_count_must_divide_by_nodes_without_expectation() {
        let descriptor = descriptor("mpirun -np 3 python train.py");
        let error = validate_descriptor(&descriptor, None).expect_err("3 ranks on 2 nodes");
        assert!(error.has_rule("process_count"));
    }

    #[test]
    fn missing_np_is_reported() {
        let descriptor = descriptor("python train.py");
        let violations = collect_descriptor_violations(&descriptor, None);
        assert!(violations.iter().any(|violation| violation.rule == "process_count"));
    }

    #[test]
    fn duplicate_and_malformed_ids_are_reported() {
        let mut descriptor = descriptor("mpirun -np 2 python train.py");
        descriptor
            .properties
            .input_directories
            .push(InputDirectory::new("SCRIPTS", "/mnt/other"));
        descriptor.properties.input_directories.push(InputDirectory::new("bad id", "/mnt/x"));

        let violations = collect_descriptor_violations(&descriptor, None);
        assert!(violations.iter().any(|violation| violation.rule == "duplicate_directory_id"));
        assert!(violations.iter().any(|violation| violation.rule == "directory_id"));
    }

    #[test]
    fn document_shape_requires_schema_and_properties() {
        let violations = collect_document_violations(&json!({ "nodeCount": 2 }));
        let rules: Vec<&str> = violations.iter().map(|violation| violation.rule.as_str()).collect();
        assert_eq!(rules, vec!["schema_url", "properties_required"]);

        assert!(collect_document_violations(&json!({ "$schema": BATCHAI_JOB_SCHEMA_URL, "properties": {} })).is_empty());
    }

    #[test]
    fn referenced_ids_are_deduplicated_in_order() {
        let ids = referenced_input_ids("-x AZ_BATCHAI_INPUT_TRAIN $AZ_BATCHAI_INPUT_SCRIPTS/a.py $AZ_BATCHAI_INPUT_TRAIN");
        assert_eq!(ids, vec!["TRAIN".to_string(), "SCRIPTS".to_string()]);
    }
}
