//! Locating and reading the `.env` file.

use std::env;
use std::path::{Path, PathBuf};

use batchai_util::{expand_tilde, find_in_ancestors};
use indexmap::IndexMap;
use tracing::{debug, info};

use super::model::{ConfigurationError, ExperimentConfig};
use super::validation::config_from_values;

/// Environment variable that points at an explicit `.env` file.
pub const ENV_FILE_VAR: &str = "BATCHAI_ENV_FILE";

const ENV_FILE_NAME: &str = ".env";

/// Returns the `.env` path to use when none is given on the command line.
///
/// `BATCHAI_ENV_FILE` wins when set; otherwise the nearest `.env` in the
/// current directory or one of its ancestors is used.
pub fn default_env_path() -> Option<PathBuf> {
    if let Ok(path) = env::var(ENV_FILE_VAR)
        && !path.trim().is_empty()
    {
        return Some(expand_tilde(&path));
    }

    let current_directory = env::current_dir().ok()?;
    find_in_ancestors(&current_directory, ENV_FILE_NAME)
}

/// Parse a `.env` file into ordered key/value pairs without touching the
/// process environment.
pub fn read_env_file(path: &Path) -> Result<IndexMap<String, String>, ConfigurationError> {
    if !path.is_file() {
        return Err(ConfigurationError::EnvFileNotFound {
            searched: path.display().to_string(),
        });
    }

    let entries = dotenvy::from_path_iter(path).map_err(|source| ConfigurationError::EnvFile {
        path: path.to_path_buf(),
        source,
    })?;

    let mut values = IndexMap::new();
    for entry in entries {
        let (key, value) = entry.map_err(|source| ConfigurationError::EnvFile {
            path: path.to_path_buf(),
            source,
        })?;
        values.insert(key, value);
    }
    debug!(path = %path.display(), keys = values.len(), "read env file");
    Ok(values)
}

/// Loads configuration from `explicit_path` or the default location.
pub fn load_config(explicit_path: Option<&Path>) -> Result<ExperimentConfig, ConfigurationError> {
    let path = match explicit_path {
        Some(path) => path.to_path_buf(),
        None => default_env_path().ok_or_else(|| ConfigurationError::EnvFileNotFound {
            searched: format!("${ENV_FILE_VAR} and {ENV_FILE_NAME} in the current directory and its parents"),
        })?,
    };
    load_config_from_path(&path)
}

/// Loads and validates configuration from a specific `.env` file.
pub fn load_config_from_path(path: &Path) -> Result<ExperimentConfig, ConfigurationError> {
    let values = read_env_file(path)?;
    let config = config_from_values(&values)?;
    info!(path = %path.display(), experiment = %config.experiment_name(), "loaded experiment configuration");
    Ok(config)
}
