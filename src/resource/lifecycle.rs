//! Create, read, update and delete of a run resource.

use chrono::Utc;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::{ReadPolicy, RunConfig};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{ResourceError, Result};
use crate::inventory::Inventory;
use crate::provider::ResolvedConfig;
use crate::runner::{CancelToken, ExecutionOutput, PlaybookInvocation, PlaybookRunner};

use super::model::RunState;

/// A lifecycle operation requested by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Run the playbook and record a new resource.
    Create {
        /// Desired attributes.
        planned: RunConfig,
    },
    /// Validate persisted state.
    Read {
        /// Persisted state.
        current: RunState,
    },
    /// Run the playbook again with the planned attributes.
    Update {
        /// Persisted state before the update.
        prior: RunState,
        /// Desired attributes.
        planned: RunConfig,
    },
    /// Forget the resource. Never runs the playbook.
    Delete {
        /// Persisted state.
        current: RunState,
    },
}

/// What an operation did to the persisted state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// Persist this state.
    Stored(RunState),
    /// Remove the state.
    Removed,
}

/// Result of [`RunResource::handle`].
///
/// `applied` is `None` when the operation failed; the caller must then keep
/// whatever state it had.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResponse {
    /// State change to persist.
    pub applied: Option<Applied>,
    /// Errors and warnings for the user.
    pub diagnostics: Diagnostics,
}

/// Lifecycle adapter for `ansible-playbook` runs.
#[derive(Clone)]
pub struct RunResource {
    config: Arc<ResolvedConfig>,
    runner: Arc<dyn PlaybookRunner>,
}

impl Operation {
    /// Short name used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Read { .. } => "read",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
        }
    }
}

impl OperationResponse {
    /// Returns true if the operation succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.applied.is_some() && !self.diagnostics.has_error()
    }
}

impl RunResource {
    /// Creates a resource bound to a provider configuration and runner.
    #[must_use]
    pub fn new(config: Arc<ResolvedConfig>, runner: Arc<dyn PlaybookRunner>) -> Self {
        Self { config, runner }
    }

    /// Returns the provider configuration.
    #[must_use]
    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Processes an operation, converting any error into a diagnostic.
    pub async fn handle(&self, operation: Operation, cancel: &CancelToken) -> OperationResponse {
        let kind = operation.kind();
        let mut diagnostics = Diagnostics::new();

        match self.dispatch(operation, cancel, &mut diagnostics).await {
            Ok(applied) => OperationResponse {
                applied: Some(applied),
                diagnostics,
            },
            Err(e) => {
                error!("Run {kind} failed: {e}");
                diagnostics.push(Diagnostic::from_error(&e));
                OperationResponse {
                    applied: None,
                    diagnostics,
                }
            }
        }
    }

    /// Processes an operation.
    ///
    /// Warnings are appended to `diagnostics`; errors are returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the inventory cannot be built, the playbook fails,
    /// or persisted attributes are invalid.
    pub async fn dispatch(
        &self,
        operation: Operation,
        cancel: &CancelToken,
        diagnostics: &mut Diagnostics,
    ) -> Result<Applied> {
        match operation {
            Operation::Create { planned } => {
                self.execute(&planned, false, cancel).await?;
                let state = RunState::created(planned, Utc::now());
                info!("Created run {}", state.id);
                Ok(Applied::Stored(state))
            }
            Operation::Read { current } => {
                self.read(&current, cancel, diagnostics).await?;
                Ok(Applied::Stored(current))
            }
            Operation::Update { prior, planned } => {
                self.execute(&planned, false, cancel).await?;
                let state = prior.updated(planned, Utc::now());
                info!("Updated run {}", state.id);
                Ok(Applied::Stored(state))
            }
            Operation::Delete { current } => {
                debug!("Removing run {} from state", current.id);
                Ok(Applied::Removed)
            }
        }
    }

    async fn read(
        &self,
        current: &RunState,
        cancel: &CancelToken,
        diagnostics: &mut Diagnostics,
    ) -> Result<()> {
        if let Some(extra_vars) = &current.attributes.extra_vars_json {
            serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(extra_vars).map_err(|e| {
                ResourceError::InvalidExtraVars {
                    message: e.to_string(),
                }
            })?;
        }

        let playbook = self.resolve_playbook(&current.attributes.playbook_file);
        if !playbook.exists() {
            warn!("Playbook {} no longer exists", playbook.display());
            diagnostics.push(
                Diagnostic::warning(
                    "Playbook file not found",
                    format!(
                        "'{}' does not exist; the next update will fail",
                        current.attributes.playbook_file
                    ),
                )
                .with_attribute("playbook_file"),
            );
        }

        if self.config.read_policy == ReadPolicy::Check {
            self.execute(&current.attributes, true, cancel).await?;
        }

        Ok(())
    }

    /// Builds the inventory and runs the playbook once.
    async fn execute(
        &self,
        attributes: &RunConfig,
        check: bool,
        cancel: &CancelToken,
    ) -> Result<ExecutionOutput> {
        let inventory = Inventory::from_specs(&attributes.hosts)?;
        let source = inventory.materialize(self.config.inventory_mode)?;

        let invocation = PlaybookInvocation::new(
            self.config.binary.clone(),
            attributes.playbook_file.clone(),
            source.argument(),
        )
        .with_stdin(source.stdin_payload().map(str::to_owned))
        .with_extra_vars(attributes.extra_vars_json.clone())
        .with_verbosity(self.config.verbosity)
        .with_check(check)
        .with_timeout(self.config.timeout)
        .with_working_dir(self.config.working_dir.clone());

        let output = self.runner.run(&invocation, cancel).await?;
        drop(source);
        Ok(output)
    }

    fn resolve_playbook(&self, playbook: &str) -> PathBuf {
        let path = PathBuf::from(playbook);
        match &self.config.working_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path,
        }
    }
}

impl fmt::Debug for RunResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunResource")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
