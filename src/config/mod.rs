//! Configuration module.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `ansibleplay.yaml`
//! - Validation of run declarations
//! - Computing configuration hashes for change detection

mod spec;
mod parser;
mod validator;
mod hash;

pub use spec::{Manifest, ProviderConfig, ReadPolicy, RunConfig, RunDeclaration, StateConfig};
pub use parser::{
    DEFAULT_MANIFEST_FILES, ENV_PLAYBOOK_BINARY, ENV_VERBOSITY, ManifestParser, find_manifest_file,
};
pub use validator::{ManifestValidator, ValidationError, ValidationResult};
pub use hash::ConfigHasher;
