//! Experiment configuration.
//!
//! The tutorial's settings live in a `.env`-style key/value file. This module
//! locates and parses that file, validates the recognized keys, and produces
//! an [`ExperimentConfig`] that is built once at start-up and passed by
//! reference to everything downstream.

mod io;
mod model;
mod validation;

pub use io::{ENV_FILE_VAR, default_env_path, load_config, load_config_from_path, read_env_file};
pub use model::{ConfigurationError, DEFAULT_DOCKER_REPOSITORY, ExperimentConfig, IMAGE_NAME, keys};
pub use validation::config_from_values;
