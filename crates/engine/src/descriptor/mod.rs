//! Job descriptor construction, validation, and file IO.

pub mod builder;
pub mod command_line;
pub mod validation;

pub use builder::{EXTFS_ROOT, JobDescriptorBuilder, TRAINING_SCRIPT, build_descriptor_from_values, read_descriptor, write_descriptor};
pub use command_line::{CommandLine, MpiArg, MpiRunCommand, ShellCommand, ShellWord};
pub use validation::{
    SchemaError, SchemaViolation, collect_descriptor_violations, collect_document_violations, embedded_process_count,
    referenced_input_ids, validate_descriptor,
};
