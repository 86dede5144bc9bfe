//! Persisted resource state.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::RunConfig;

/// State of a run resource after a successful create or update.
///
/// `id` and `last_execution` only change when the playbook actually ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    /// Random positive identifier, assigned once at create.
    pub id: i64,
    /// Attributes echoed verbatim from the configuration that was applied.
    #[serde(flatten)]
    pub attributes: RunConfig,
    /// When the playbook last ran successfully.
    pub last_execution: DateTime<Utc>,
}

impl RunState {
    /// Builds the state of a freshly created run.
    #[must_use]
    pub fn created(attributes: RunConfig, at: DateTime<Utc>) -> Self {
        Self {
            id: new_id(),
            attributes,
            last_execution: at,
        }
    }

    /// Builds the state after an update, keeping the identifier.
    #[must_use]
    pub fn updated(&self, attributes: RunConfig, at: DateTime<Utc>) -> Self {
        Self {
            id: self.id,
            attributes,
            last_execution: at,
        }
    }

    /// The identifier as a string.
    #[must_use]
    pub fn id_string(&self) -> String {
        self.id.to_string()
    }

    /// RFC 3339 rendering of the last execution time.
    #[must_use]
    pub fn last_execution_rfc3339(&self) -> String {
        self.last_execution.to_rfc3339()
    }
}

/// Draws a random positive 63-bit identifier.
fn new_id() -> i64 {
    rand::thread_rng().gen_range(1..=i64::MAX)
}
