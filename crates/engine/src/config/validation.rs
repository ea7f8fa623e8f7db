//! Validation of raw `.env` values into an [`ExperimentConfig`].

use std::env;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::model::{ConfigurationError, DEFAULT_DOCKER_REPOSITORY, ExperimentConfig, keys};

/// Resource names end up in `az` arguments and in the experiment name.
static RESOURCE_NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._()-]*$").expect("resource name regex should compile"));

static REPOSITORY_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._:-]*(/[A-Za-z0-9][A-Za-z0-9._-]*)*$").expect("repository regex should compile"));

/// Upper bound on nodes and on ranks per node.
const MAX_COUNT: u32 = 10_000;

/// Build an [`ExperimentConfig`] from raw key/value pairs.
///
/// Every key in [`keys::REQUIRED`] must be present and non-blank. `USE_FAKE`
/// defaults to `false`. `DOCKER_REPOSITORY` falls back to the process
/// environment and then to [`DEFAULT_DOCKER_REPOSITORY`].
pub fn config_from_values(values: &IndexMap<String, String>) -> Result<ExperimentConfig, ConfigurationError> {
    let group_name = resource_name(values, keys::GROUP_NAME)?;
    let file_share_name = resource_name(values, keys::FILE_SHARE_NAME)?;
    let workspace = resource_name(values, keys::WORKSPACE)?;
    let num_nodes = count(values, keys::NUM_NODES)?;
    let cluster_name = resource_name(values, keys::CLUSTER_NAME)?;
    let gpu_type = resource_name(values, keys::GPU_TYPE)?;
    let processes_per_node = count(values, keys::PROCESSES_PER_NODE)?;

    let use_fake = match optional(values, keys::USE_FAKE) {
        Some(raw) => parse_flag(keys::USE_FAKE, &raw)?,
        None => false,
    };

    let docker_repository = optional(values, keys::DOCKER_REPOSITORY)
        .or_else(|| env::var(keys::DOCKER_REPOSITORY).ok().filter(|value| !value.trim().is_empty()))
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_DOCKER_REPOSITORY.to_string());
    if !REPOSITORY_REGEX.is_match(&docker_repository) {
        return Err(ConfigurationError::InvalidValue {
            key: keys::DOCKER_REPOSITORY.to_string(),
            value: docker_repository,
            reason: "expected a registry repository such as 'myhub' or 'registry.io/team'".to_string(),
        });
    }

    let config = ExperimentConfig {
        group_name,
        file_share_name,
        workspace,
        cluster_name,
        gpu_type,
        num_nodes,
        processes_per_node,
        use_fake,
        docker_repository,
    };
    debug!(
        workspace = %config.workspace,
        cluster = %config.cluster_name,
        num_nodes = config.num_nodes,
        processes_per_node = config.processes_per_node,
        "validated experiment configuration"
    );
    Ok(config)
}

fn required(values: &IndexMap<String, String>, key: &str) -> Result<String, ConfigurationError> {
    let value = values.get(key).ok_or_else(|| ConfigurationError::MissingKey { key: key.to_string() })?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigurationError::EmptyKey { key: key.to_string() });
    }
    Ok(trimmed.to_string())
}

fn optional(values: &IndexMap<String, String>, key: &str) -> Option<String> {
    values
        .get(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn resource_name(values: &IndexMap<String, String>, key: &str) -> Result<String, ConfigurationError> {
    let value = required(values, key)?;
    if !RESOURCE_NAME_REGEX.is_match(&value) {
        return Err(ConfigurationError::InvalidValue {
            key: key.to_string(),
            value,
            reason: "names may contain letters, digits, '.', '_', '-', and parentheses".to_string(),
        });
    }
    Ok(value)
}

fn count(values: &IndexMap<String, String>, key: &str) -> Result<u32, ConfigurationError> {
    let raw = required(values, key)?;
    let invalid = |reason: String| ConfigurationError::InvalidValue {
        key: key.to_string(),
        value: raw.clone(),
        reason,
    };
    let parsed: u32 = raw
        .parse()
        .map_err(|error| invalid(format!("expected a positive integer ({error})")))?;
    if parsed == 0 {
        return Err(invalid("must be at least 1".to_string()));
    }
    if parsed > MAX_COUNT {
        return Err(invalid(format!("must not exceed {MAX_COUNT}")));
    }
    Ok(parsed)
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, ConfigurationError> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigurationError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_values() -> IndexMap<String, String> {
        [
            ("GROUP_NAME", "batchrg"),
            ("FILE_SHARE_NAME", "batchshare"),
            ("WORKSPACE", "workspace"),
            ("NUM_NODES", "2"),
            ("CLUSTER_NAME", "gpucluster"),
            ("GPU_TYPE", "V100"),
            ("PROCESSES_PER_NODE", "4"),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
    }

    #[test]
    fn parses_complete_configuration() {
        temp_env::with_var_unset("DOCKER_REPOSITORY", || {
            let config = config_from_values(&base_values()).expect("valid config");
            assert_eq!(config.num_nodes, 2);
            assert_eq!(config.processes_per_node, 4);
            assert!(!config.use_fake);
            assert_eq!(config.docker_repository, DEFAULT_DOCKER_REPOSITORY);
        });
    }

    #[test]
    fn every_required_key_is_enforced() {
        for key in keys::REQUIRED {
            let mut values = base_values();
            values.shift_remove(key);
            let error = config_from_values(&values).expect_err("missing key rejected");
            assert!(matches!(error, ConfigurationError::MissingKey { .. }), "{key}: {error}");
            assert_eq!(error.key(), Some(key));
        }
    }

    #[test]
    fn blank_values_are_empty_keys() {
        let mut values = base_values();
        values.insert("WORKSPACE".into(), "   ".into());
        let error = config_from_values(&values).expect_err("blank rejected");
        assert!(matches!(error, ConfigurationError::EmptyKey { ref key } if key == "WORKSPACE"));
    }

    #[test]
    fn counts_must_be_positive_integers() {
        for bad in ["0", "-1", "two", "4.5", "10001"] {
            let mut values = base_values();
            values.insert("NUM_NODES".into(), bad.into());
            let error = config_from_values(&values).expect_err("bad count rejected");
            assert!(
                matches!(error, ConfigurationError::InvalidValue { ref key, .. } if key == "NUM_NODES"),
                "{bad}: {error}"
            );
        }
    }

    #[test]
    fn use_fake_accepts_python_style_booleans() {
        let mut values = base_values();
        values.insert("USE_FAKE".into(), "True".into());
        assert!(config_from_values(&values).expect("valid").use_fake);

        values.insert("USE_FAKE".into(), "maybe".into());
        assert!(config_from_values(&values).is_err());
    }

    #[test]
    fn docker_repository_prefers_file_then_environment() {
        temp_env::with_var("DOCKER_REPOSITORY", Some("envhub"), || {
            let config = config_from_values(&base_values()).expect("valid");
            assert_eq!(config.docker_repository, "envhub");

            let mut values = base_values();
            values.insert("DOCKER_REPOSITORY".into(), "filehub".into());
            let config = config_from_values(&values).expect("valid");
            assert_eq!(config.docker_repository, "filehub");
        });
    }

    #[test]
    fn resource_names_reject_whitespace() {
        let mut values = base_values();
        values.insert("CLUSTER_NAME".into(), "gpu cluster".into());
        let error = config_from_values(&values).expect_err("whitespace rejected");
        assert_eq!(error.key(), Some("CLUSTER_NAME"));
    }
}
