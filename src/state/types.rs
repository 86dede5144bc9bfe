//! State types for tracking applied runs.
//!
//! These types record what was last applied for every run name, used by the
//! planner to decide between create, update, replace and delete.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::resource::RunState;

/// Current version of the state format.
pub const STATE_VERSION: &str = "1";

/// Number of history entries kept.
pub const MAX_HISTORY: usize = 100;

/// The complete provider state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderState {
    /// State format version.
    pub version: String,
    /// Applied runs by name.
    #[serde(default)]
    pub runs: BTreeMap<String, RunRecord>,
    /// When the state was last updated.
    pub last_updated: DateTime<Utc>,
    /// Operation history (recent entries).
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// A run as last applied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunRecord {
    /// Resource state returned by the lifecycle.
    pub state: RunState,
    /// Hash of the applied attributes.
    pub config_hash: String,
    /// Hash of the triggers at apply time.
    pub trigger_hash: String,
    /// Runs this one depended on when applied; used to order deletes.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// When this record was written.
    pub updated_at: DateTime<Utc>,
}

/// A single entry in the operation history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    /// When the operation finished.
    pub timestamp: DateTime<Utc>,
    /// Type of operation.
    pub operation: HistoryOperation,
    /// Run name.
    pub run: String,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Optional error message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Types of recorded operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HistoryOperation {
    /// First run of the playbook.
    Create,
    /// Re-run after an attribute change.
    Update,
    /// Forget and re-create after a trigger change.
    Replace,
    /// Forget the run.
    Delete,
    /// Read back persisted state.
    Refresh,
}

impl ProviderState {
    /// Creates a new empty state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            runs: BTreeMap::new(),
            last_updated: Utc::now(),
            history: Vec::new(),
        }
    }

    /// Gets a run record by name.
    #[must_use]
    pub fn get_run(&self, name: &str) -> Option<&RunRecord> {
        self.runs.get(name)
    }

    /// Adds or replaces a run record.
    pub fn set_run(&mut self, name: impl Into<String>, record: RunRecord) {
        self.runs.insert(name.into(), record);
        self.last_updated = Utc::now();
    }

    /// Removes a run record by name.
    pub fn remove_run(&mut self, name: &str) -> Option<RunRecord> {
        let result = self.runs.remove(name);
        if result.is_some() {
            self.last_updated = Utc::now();
        }
        result
    }

    /// Adds a history entry, dropping the oldest beyond [`MAX_HISTORY`].
    pub fn add_history(&mut self, entry: HistoryEntry) {
        if self.history.len() >= MAX_HISTORY {
            self.history.remove(0);
        }
        self.history.push(entry);
    }

    /// Returns all run names in sorted order.
    #[must_use]
    pub fn run_names(&self) -> Vec<&str> {
        self.runs.keys().map(String::as_str).collect()
    }
}

impl Default for ProviderState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunRecord {
    /// Creates a record stamped now.
    #[must_use]
    pub fn new(
        state: RunState,
        config_hash: impl Into<String>,
        trigger_hash: impl Into<String>,
        depends_on: Vec<String>,
    ) -> Self {
        Self {
            state,
            config_hash: config_hash.into(),
            trigger_hash: trigger_hash.into(),
            depends_on,
            updated_at: Utc::now(),
        }
    }
}

impl HistoryEntry {
    /// Creates a successful history entry.
    #[must_use]
    pub fn new(operation: HistoryOperation, run: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            run: run.into(),
            success: true,
            error: None,
        }
    }

    /// Creates a failed history entry.
    #[must_use]
    pub fn failed(operation: HistoryOperation, run: impl Into<String>, error: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            run: run.into(),
            success: false,
            error: Some(error.to_string()),
        }
    }
}

impl std::fmt::Display for HistoryOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
            Self::Refresh => "refresh",
        };
        write!(f, "{op}")
    }
}
