//! Manifest types.
//!
//! This module defines the structs that map to the `ansibleplay.yaml`
//! manifest: provider options, state location and the declared runs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::inventory::InventoryMode;

/// The root manifest structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    /// Provider-level configuration.
    #[serde(default)]
    pub provider: ProviderConfig,
    /// State storage configuration.
    #[serde(default)]
    pub state: StateConfig,
    /// Declared playbook runs.
    #[serde(default)]
    pub runs: Vec<RunDeclaration>,
}

/// Provider-level configuration shared by every run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Path to the `ansible-playbook` binary; looked up on `PATH` if absent.
    #[serde(default)]
    pub ansible_playbook_binary: Option<String>,
    /// Verbosity level passed to the playbook (0 = silent).
    #[serde(default)]
    pub verbosity: Option<u8>,
    /// How the inventory document is handed to the binary.
    #[serde(default)]
    pub inventory_mode: InventoryMode,
    /// What a read does.
    #[serde(default)]
    pub read_policy: ReadPolicy,
    /// Per-invocation time limit in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Behavior of the read lifecycle operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReadPolicy {
    /// Validate persisted attributes only; never run the playbook.
    #[default]
    Inert,
    /// Additionally run the playbook in `--check` mode.
    Check,
}

/// State storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateConfig {
    /// State directory; defaults to `.ansibleplay` next to the manifest.
    #[serde(default)]
    pub path: Option<String>,
}

/// The attributes of a run resource.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunConfig {
    /// Host entries: an address optionally followed by a space and a JSON
    /// object of host variables.
    pub hosts: Vec<String>,
    /// Path to the playbook to run.
    pub playbook_file: String,
    /// JSON-encoded map of extra variables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_vars_json: Option<String>,
}

/// A run as declared in the manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunDeclaration {
    /// Unique run name.
    pub name: String,
    /// Resource attributes.
    #[serde(flatten)]
    pub config: RunConfig,
    /// Runs that must be applied first.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Arbitrary values; any change forces the run to be replaced.
    #[serde(default)]
    pub triggers: BTreeMap<String, String>,
    /// Replace the run whenever the playbook file content changes.
    #[serde(default)]
    pub replace_on_playbook_change: bool,
}

impl Manifest {
    /// Gets a run declaration by name.
    #[must_use]
    pub fn get_run(&self, name: &str) -> Option<&RunDeclaration> {
        self.runs.iter().find(|r| r.name == name)
    }

    /// Returns all run names in declaration order.
    #[must_use]
    pub fn run_names(&self) -> Vec<&str> {
        self.runs.iter().map(|r| r.name.as_str()).collect()
    }
}

impl RunConfig {
    /// Creates a run configuration without extra variables.
    #[must_use]
    pub fn new(hosts: Vec<String>, playbook_file: impl Into<String>) -> Self {
        Self {
            hosts,
            playbook_file: playbook_file.into(),
            extra_vars_json: None,
        }
    }

    /// Sets the extra variables.
    #[must_use]
    pub fn with_extra_vars(mut self, extra_vars_json: impl Into<String>) -> Self {
        self.extra_vars_json = Some(extra_vars_json.into());
        self
    }
}

impl std::fmt::Display for ReadPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let policy = match self {
            Self::Inert => "inert",
            Self::Check => "check",
        };
        write!(f, "{policy}")
    }
}
