//! Error types for the ansibleplay provider.
//!
//! This module provides the error hierarchy for every stage of a run's
//! lifecycle: manifest configuration, provider resolution, inventory
//! generation, playbook execution, resource validation, state management
//! and planning.

use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// The main error type for the ansibleplay provider.
#[derive(Debug, Error)]
pub enum AnsiblePlayError {
    /// Manifest configuration errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Provider configuration could not be resolved.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Inventory generation errors.
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    /// Playbook execution errors.
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Resource attribute errors.
    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    /// State management errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Planning errors.
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Manifest configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The manifest file was not found.
    #[error("Manifest file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The manifest could not be parsed.
    #[error("Failed to parse manifest: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Manifest validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// An environment override holds an unusable value.
    #[error("Invalid value for environment variable {name}: {value}")]
    InvalidEnvVar {
        /// Name of the variable.
        name: String,
        /// The rejected value.
        value: String,
    },

    /// Duplicate run definition.
    #[error("Duplicate run name: {name}")]
    DuplicateName {
        /// The duplicated name.
        name: String,
    },

    /// Circular dependency detected.
    #[error("Circular dependency detected: {cycle}")]
    CircularDependency {
        /// Description of the cycle.
        cycle: String,
    },
}

/// Provider configuration errors. These block every resource operation.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The playbook binary is not on the search path.
    #[error("{name} binary not found in PATH: {source}")]
    BinaryNotFound {
        /// Executable name that was searched for.
        name: String,
        /// Lookup failure.
        #[source]
        source: which::Error,
    },

    /// An explicitly configured binary could not be stat'd.
    #[error("ansible-playbook binary '{}' could not be stat'd: {source}", path.display())]
    BinaryNotStatable {
        /// The configured path.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: std::io::Error,
    },
}

/// Inventory generation errors.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// A host entry carried an attribute segment that is not a JSON object.
    #[error("unable to parse host attributes for '{address}': {source}")]
    MalformedHostAttributes {
        /// Address of the offending host entry.
        address: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The host entry has no address.
    #[error("host entry '{spec}' has an empty address")]
    EmptyAddress {
        /// The raw host entry.
        spec: String,
    },

    /// The inventory document could not be encoded.
    #[error("failed to encode inventory document: {message}")]
    Encode {
        /// Description of the encoding error.
        message: String,
    },

    /// The temporary inventory file could not be created or written.
    #[error("failed to write temporary inventory file: {source}")]
    Write {
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Playbook execution errors.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The process could not be started.
    #[error("failed to launch '{}': {source}", binary.display())]
    Launch {
        /// Binary that failed to start.
        binary: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The process exited unsuccessfully.
    #[error("ansible play failed: {status}: {stderr}")]
    Failed {
        /// Exit status of the process.
        status: ExitStatus,
        /// Captured standard error, verbatim.
        stderr: String,
    },

    /// The invocation was cancelled and the process terminated.
    #[error("ansible play cancelled")]
    Cancelled,

    /// The invocation exceeded its time limit and the process was terminated.
    #[error("ansible play timed out after {secs}s")]
    TimedOut {
        /// Configured limit in seconds.
        secs: u64,
    },

    /// Communicating with the process failed.
    #[error("failed to communicate with ansible-playbook: {message}")]
    Io {
        /// Description of the failure.
        message: String,
    },
}

/// Resource attribute errors.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// `extra_vars_json` does not hold valid JSON.
    #[error("extra_vars_json is not valid: expected a valid json object ({message})")]
    InvalidExtraVars {
        /// Underlying parse error.
        message: String,
    },
}

/// State management errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Writing the state failed.
    #[error("Failed to write state: {message}")]
    WriteFailed {
        /// Description of the failure.
        message: String,
    },

    /// State lock acquisition failed.
    #[error("Failed to acquire state lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// State lock is held by another process.
    #[error("State is locked by another process (lock holder: {holder}, since: {since})")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// State version mismatch.
    #[error("State version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected state version.
        expected: String,
        /// Found state version.
        found: String,
    },
}

/// Planning errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// A requested run is not part of the manifest.
    #[error("Unknown run: {name}")]
    UnknownRun {
        /// The unknown run name.
        name: String,
    },

    /// Plan execution was aborted.
    #[error("Plan aborted: {reason}")]
    Aborted {
        /// Reason for abort.
        reason: String,
    },
}

/// Result type alias for ansibleplay operations.
pub type Result<T> = std::result::Result<T, AnsiblePlayError>;

impl AnsiblePlayError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if the error came from a cancelled or timed out invocation.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(
            self,
            Self::Execution(ExecutionError::Cancelled | ExecutionError::TimedOut { .. })
        )
    }

    /// Returns the resource attribute the error is scoped to, if any.
    #[must_use]
    pub const fn attribute(&self) -> Option<&'static str> {
        match self {
            Self::Resource(ResourceError::InvalidExtraVars { .. }) => Some("extra_vars_json"),
            Self::Inventory(
                InventoryError::MalformedHostAttributes { .. } | InventoryError::EmptyAddress { .. },
            ) => Some("hosts"),
            _ => None,
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl StateError {
    /// Creates a write error with the given message.
    #[must_use]
    pub fn write(message: impl Into<String>) -> Self {
        Self::WriteFailed {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_classification() {
        let cancelled = AnsiblePlayError::Execution(ExecutionError::Cancelled);
        assert!(cancelled.is_cancellation());

        let timed_out = AnsiblePlayError::Execution(ExecutionError::TimedOut { secs: 5 });
        assert!(timed_out.is_cancellation());

        let other = AnsiblePlayError::internal("boom");
        assert!(!other.is_cancellation());
    }

    #[test]
    fn test_attribute_scope() {
        let err = AnsiblePlayError::Resource(ResourceError::InvalidExtraVars {
            message: String::from("expected value"),
        });
        assert_eq!(err.attribute(), Some("extra_vars_json"));
        assert_eq!(AnsiblePlayError::internal("x").attribute(), None);
    }
}
