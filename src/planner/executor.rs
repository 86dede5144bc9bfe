//! Plan executor for applying plans.
//!
//! Ready actions run concurrently on a [`JoinSet`], bounded by the configured
//! parallelism. An action is ready once every run it depends on has
//! succeeded; it is skipped if any of them failed or was skipped. The state
//! is only mutated here, one finished action at a time, and only on success.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::RunConfig;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{AnsiblePlayError, Result};
use crate::resource::{Applied, Operation, OperationResponse, RunResource, RunState};
use crate::runner::CancelToken;
use crate::state::{HistoryEntry, HistoryOperation, ProviderState, RunRecord, StateStore};

use super::plan::{ActionType, ApplyPlan, PlannedAction};

/// Default number of concurrent playbook runs.
pub const DEFAULT_PARALLELISM: usize = 10;

/// Executor for apply plans.
#[derive(Clone)]
pub struct PlanExecutor {
    /// Lifecycle adapter shared by every action.
    resource: RunResource,
    /// Store the state is saved to after every finished action.
    store: Option<Arc<dyn StateStore>>,
    /// Maximum concurrent actions.
    parallelism: usize,
    /// Cancels in-flight runs and stops scheduling new ones.
    cancel: CancelToken,
}

/// How an action ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The action was applied.
    Succeeded,
    /// The action ran and failed.
    Failed,
    /// The action never ran.
    Skipped,
}

/// Result of executing a single action.
#[derive(Debug, Clone)]
pub struct ActionResult {
    /// Action that was executed.
    pub action: PlannedAction,
    /// How it ended.
    pub outcome: ActionOutcome,
    /// Resource id after the action, if one exists.
    pub run_id: Option<i64>,
    /// Errors and warnings.
    pub diagnostics: Diagnostics,
}

/// Result of executing the entire plan.
#[derive(Debug, Default)]
pub struct ExecutionResult {
    /// Individual action results, in completion order.
    pub results: Vec<ActionResult>,
    /// Number of successful actions.
    pub successful: usize,
    /// Number of failed actions.
    pub failed: usize,
    /// Number of skipped actions.
    pub skipped: usize,
}

/// Result of reading back one recorded run.
#[derive(Debug, Clone)]
pub struct RefreshReport {
    /// Run name.
    pub name: String,
    /// Whether the read succeeded.
    pub success: bool,
    /// Errors and warnings.
    pub diagnostics: Diagnostics,
}

/// Work handed to a spawned task.
enum Work {
    Single(Operation),
    Replace { current: RunState, planned: RunConfig },
    /// Nothing recorded to delete.
    Forget,
    /// The plan carries no declaration to apply.
    Missing,
}

impl PlanExecutor {
    /// Creates a new plan executor.
    #[must_use]
    pub fn new(resource: RunResource) -> Self {
        Self {
            resource,
            store: None,
            parallelism: DEFAULT_PARALLELISM,
            cancel: CancelToken::never(),
        }
    }

    /// Saves state to `store` after every finished action.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the maximum number of concurrent actions (at least one).
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Executes an apply plan.
    ///
    /// Action failures are reported in the result; only state persistence
    /// failures abort execution.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be saved or a task panics.
    pub async fn execute(&self, plan: &ApplyPlan, state: &mut ProviderState) -> Result<ExecutionResult> {
        info!(
            "Executing plan with {} actions (parallelism {})",
            plan.actions.len(),
            self.parallelism
        );

        let mut result = ExecutionResult::default();
        let mut pending: Vec<usize> = (0..plan.actions.len()).collect();
        let mut succeeded: HashSet<String> = HashSet::new();
        let mut unsuccessful: HashSet<String> = HashSet::new();
        let mut running: JoinSet<(usize, OperationResponse)> = JoinSet::new();

        loop {
            // Skips cascade, so repeat until no more are found
            let mut skipped_any = true;
            while skipped_any {
                skipped_any = false;
                pending.retain(|&index| {
                    let action = &plan.actions[index];
                    if !action.depends_on.iter().any(|d| unsuccessful.contains(d)) {
                        return true;
                    }
                    warn!("Skipping {} due to failed dependencies", action.name);
                    unsuccessful.insert(action.name.clone());
                    result.push_skipped(action, "a dependency failed");
                    skipped_any = true;
                    false
                });
            }

            let mut i = 0;
            while i < pending.len() {
                let index = pending[i];
                let action = &plan.actions[index];

                let ready = action.depends_on.iter().all(|d| succeeded.contains(d));
                if ready && running.len() < self.parallelism && !self.cancel.is_cancelled() {
                    debug!("Starting: {}", action.description());
                    let work = Self::work_for(action, state);
                    let resource = self.resource.clone();
                    let cancel = self.cancel.clone();
                    running.spawn(async move { (index, perform(&resource, work, &cancel).await) });
                    pending.remove(i);
                    continue;
                }

                i += 1;
            }

            if running.is_empty() {
                for index in pending.drain(..) {
                    let action = &plan.actions[index];
                    let reason = if self.cancel.is_cancelled() {
                        "cancelled"
                    } else {
                        "dependencies can never be satisfied"
                    };
                    warn!("Skipping {}: {reason}", action.name);
                    result.push_skipped(action, reason);
                }
                break;
            }

            let Some(joined) = running.join_next().await else {
                continue;
            };
            let (index, response) =
                joined.map_err(|e| AnsiblePlayError::internal(format!("Action task failed: {e}")))?;
            let action = &plan.actions[index];

            let (outcome, run_id) = self.record(action, &response, state);
            if outcome == ActionOutcome::Succeeded {
                succeeded.insert(action.name.clone());
            } else {
                unsuccessful.insert(action.name.clone());
            }
            self.persist(state).await?;
            result.push(action, outcome, run_id, response.diagnostics);
        }

        info!("{result}");
        Ok(result)
    }

    /// Reads back every recorded run.
    ///
    /// A failed read leaves the recorded state untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be saved or a task panics.
    pub async fn refresh(&self, state: &mut ProviderState) -> Result<Vec<RefreshReport>> {
        let names: Vec<String> = state.runs.keys().cloned().collect();
        info!("Refreshing {} runs", names.len());

        let mut reports = Vec::with_capacity(names.len());
        let mut running: JoinSet<(String, OperationResponse)> = JoinSet::new();
        let mut queue = names.into_iter();

        loop {
            while running.len() < self.parallelism && !self.cancel.is_cancelled() {
                let Some(name) = queue.next() else {
                    break;
                };
                let Some(record) = state.get_run(&name) else {
                    continue;
                };
                let operation = Operation::Read {
                    current: record.state.clone(),
                };
                let resource = self.resource.clone();
                let cancel = self.cancel.clone();
                running.spawn(async move { (name, resource.handle(operation, &cancel).await) });
            }

            let Some(joined) = running.join_next().await else {
                break;
            };
            let (name, response) =
                joined.map_err(|e| AnsiblePlayError::internal(format!("Refresh task failed: {e}")))?;

            let success = response.is_success();
            if success {
                // Reads never change the markers, so the record stays as is
                state.add_history(HistoryEntry::new(HistoryOperation::Refresh, &name));
            } else {
                error!("Refresh of {name} failed");
                state.add_history(HistoryEntry::failed(
                    HistoryOperation::Refresh,
                    &name,
                    &response.diagnostics.to_string(),
                ));
            }

            reports.push(RefreshReport {
                name,
                success,
                diagnostics: response.diagnostics,
            });
        }

        for name in queue {
            reports.push(RefreshReport {
                name,
                success: false,
                diagnostics: skipped_diagnostics("cancelled"),
            });
        }

        self.persist(state).await?;
        Ok(reports)
    }

    /// Builds the lifecycle work for an action from the current state.
    fn work_for(action: &PlannedAction, state: &ProviderState) -> Work {
        let current = state.get_run(&action.name).map(|r| r.state.clone());
        let planned = action.declaration.as_ref().map(|d| d.config.clone());

        match (action.action_type, current, planned) {
            (ActionType::Delete, Some(current), _) => Work::Single(Operation::Delete { current }),
            (ActionType::Delete, None, _) => Work::Forget,
            (_, _, None) => Work::Missing,
            (ActionType::Update, Some(prior), Some(planned)) => {
                Work::Single(Operation::Update { prior, planned })
            }
            (ActionType::Replace, Some(current), Some(planned)) => Work::Replace { current, planned },
            (_, _, Some(planned)) => Work::Single(Operation::Create { planned }),
        }
    }

    /// Applies a finished action to the state.
    fn record(
        &self,
        action: &PlannedAction,
        response: &OperationResponse,
        state: &mut ProviderState,
    ) -> (ActionOutcome, Option<i64>) {
        let operation = history_operation(action.action_type);

        if !response.is_success() {
            error!("{} failed", action.description());
            state.add_history(HistoryEntry::failed(
                operation,
                &action.name,
                &response.diagnostics.to_string(),
            ));
            return (ActionOutcome::Failed, None);
        }

        let run_id = match &response.applied {
            Some(Applied::Stored(run)) => {
                let record = RunRecord::new(
                    run.clone(),
                    action.config_hash.clone().unwrap_or_default(),
                    action.trigger_hash.clone().unwrap_or_default(),
                    action
                        .declaration
                        .as_ref()
                        .map(|d| d.depends_on.clone())
                        .unwrap_or_default(),
                );
                state.set_run(action.name.clone(), record);
                Some(run.id)
            }
            Some(Applied::Removed) | None => {
                state.remove_run(&action.name);
                None
            }
        };

        info!("{} succeeded", action.description());
        state.add_history(HistoryEntry::new(operation, &action.name));
        (ActionOutcome::Succeeded, run_id)
    }

    async fn persist(&self, state: &ProviderState) -> Result<()> {
        match &self.store {
            Some(store) => store.save(state).await,
            None => Ok(()),
        }
    }
}

/// Runs the lifecycle work of one action.
async fn perform(resource: &RunResource, work: Work, cancel: &CancelToken) -> OperationResponse {
    match work {
        Work::Single(operation) => resource.handle(operation, cancel).await,
        Work::Replace { current, planned } => {
            let removed = resource.handle(Operation::Delete { current }, cancel).await;
            if !removed.is_success() {
                return removed;
            }
            let mut created = resource.handle(Operation::Create { planned }, cancel).await;
            let mut diagnostics = removed.diagnostics;
            for diagnostic in &created.diagnostics {
                diagnostics.push(diagnostic.clone());
            }
            created.diagnostics = diagnostics;
            created
        }
        Work::Forget => OperationResponse {
            applied: Some(Applied::Removed),
            diagnostics: Diagnostics::new(),
        },
        Work::Missing => {
            let mut diagnostics = Diagnostics::new();
            diagnostics.push(Diagnostic::error(
                "Missing run declaration",
                "the plan does not carry the attributes to apply",
            ));
            OperationResponse {
                applied: None,
                diagnostics,
            }
        }
    }
}

const fn history_operation(action_type: ActionType) -> HistoryOperation {
    match action_type {
        ActionType::Create => HistoryOperation::Create,
        ActionType::Update => HistoryOperation::Update,
        ActionType::Replace => HistoryOperation::Replace,
        ActionType::Delete => HistoryOperation::Delete,
    }
}

fn skipped_diagnostics(reason: &str) -> Diagnostics {
    let mut diagnostics = Diagnostics::new();
    diagnostics.push(Diagnostic::error("Skipped", reason));
    diagnostics
}

impl ExecutionResult {
    fn push(
        &mut self,
        action: &PlannedAction,
        outcome: ActionOutcome,
        run_id: Option<i64>,
        diagnostics: Diagnostics,
    ) {
        match outcome {
            ActionOutcome::Succeeded => self.successful += 1,
            ActionOutcome::Failed => self.failed += 1,
            ActionOutcome::Skipped => self.skipped += 1,
        }
        self.results.push(ActionResult {
            action: action.clone(),
            outcome,
            run_id,
            diagnostics,
        });
    }

    fn push_skipped(&mut self, action: &PlannedAction, reason: &str) {
        self.skipped += 1;
        self.results.push(ActionResult {
            action: action.clone(),
            outcome: ActionOutcome::Skipped,
            run_id: None,
            diagnostics: skipped_diagnostics(reason),
        });
    }

    /// Returns true if every action succeeded.
    #[must_use]
    pub const fn all_successful(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }

    /// Gets the result for a run.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ActionResult> {
        self.results.iter().find(|r| r.action.name == name)
    }
}

impl std::fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Executed {} actions: {} successful, {} failed, {} skipped",
            self.results.len(),
            self.successful,
            self.failed,
            self.skipped
        )
    }
}

impl std::fmt::Debug for PlanExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanExecutor")
            .field("resource", &self.resource)
            .field("parallelism", &self.parallelism)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Manifest, ReadPolicy, RunDeclaration};
    use crate::error::ExecutionError;
    use crate::inventory::InventoryMode;
    use crate::planner::DiffEngine;
    use crate::provider::ResolvedConfig;
    use crate::runner::{CancelSource, ExecutionOutput, MockPlaybookRunner};
    use crate::state::LocalStateStore;
    use std::path::PathBuf;

    fn declaration(name: &str, depends_on: &[&str]) -> RunDeclaration {
        RunDeclaration {
            name: name.to_string(),
            config: RunConfig::new(vec![String::from("10.0.0.1")], format!("{name}.yml")),
            depends_on: depends_on.iter().map(|d| (*d).to_string()).collect(),
            ..RunDeclaration::default()
        }
    }

    fn executor(runner: MockPlaybookRunner) -> PlanExecutor {
        let config = Arc::new(ResolvedConfig {
            binary: PathBuf::from("/usr/bin/ansible-playbook"),
            verbosity: 0,
            inventory_mode: InventoryMode::Stdin,
            read_policy: ReadPolicy::Inert,
            timeout: None,
            working_dir: None,
        });
        PlanExecutor::new(RunResource::new(config, Arc::new(runner)))
    }

    /// Fails every run of `failing`, succeeds otherwise.
    fn runner_failing(failing: &'static str) -> MockPlaybookRunner {
        let mut runner = MockPlaybookRunner::new();
        runner.expect_run().returning(move |invocation, _| {
            if invocation.playbook == failing {
                Err(ExecutionError::Io {
                    message: String::from("unreachable"),
                })
            } else {
                Ok(ExecutionOutput::default())
            }
        });
        runner
    }

    fn plan_for(manifest: &Manifest, state: &ProviderState) -> ApplyPlan {
        let diff = DiffEngine::new().compute_diff(manifest, Some(state), &[]).unwrap();
        ApplyPlan::from_diff(&diff, manifest, Some(state))
    }

    #[tokio::test]
    async fn test_apply_records_state() {
        let manifest = Manifest {
            runs: vec![declaration("base", &[]), declaration("web", &["base"])],
            ..Manifest::default()
        };
        let mut state = ProviderState::new();
        let plan = plan_for(&manifest, &state);

        let result = executor(runner_failing("none"))
            .execute(&plan, &mut state)
            .await
            .unwrap();

        assert!(result.all_successful());
        assert_eq!(result.successful, 2);
        assert_eq!(state.run_names(), ["base", "web"]);
        assert_eq!(state.get_run("web").unwrap().depends_on, ["base"]);
        assert_eq!(
            result.get("web").unwrap().run_id,
            Some(state.get_run("web").unwrap().state.id)
        );

        // Dependency finishes before the dependent starts
        let order: Vec<&str> = result.results.iter().map(|r| r.action.name.as_str()).collect();
        assert_eq!(order, ["base", "web"]);

        let again = plan_for(&manifest, &state);
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_failed_dependency_skips_dependents() {
        let manifest = Manifest {
            runs: vec![
                declaration("base", &[]),
                declaration("web", &["base"]),
                declaration("edge", &["web"]),
                declaration("db", &[]),
            ],
            ..Manifest::default()
        };
        let mut state = ProviderState::new();
        let plan = plan_for(&manifest, &state);

        let result = executor(runner_failing("base.yml"))
            .execute(&plan, &mut state)
            .await
            .unwrap();

        assert_eq!(result.failed, 1);
        assert_eq!(result.skipped, 2);
        assert_eq!(result.successful, 1);
        assert_eq!(result.get("edge").unwrap().outcome, ActionOutcome::Skipped);
        assert_eq!(state.run_names(), ["db"]);
        assert!(state.history.iter().any(|h| h.run == "base" && !h.success));
    }

    #[tokio::test]
    async fn test_replace_assigns_new_id() {
        let mut run = declaration("web", &[]);
        let mut manifest = Manifest {
            runs: vec![run.clone()],
            ..Manifest::default()
        };
        let mut state = ProviderState::new();
        let exec = executor(runner_failing("none"));
        exec.execute(&plan_for(&manifest, &state), &mut state).await.unwrap();
        let first_id = state.get_run("web").unwrap().state.id;

        run.triggers.insert(String::from("release"), String::from("2"));
        manifest.runs = vec![run];
        let plan = plan_for(&manifest, &state);
        assert_eq!(plan.get_action("web").unwrap().action_type, ActionType::Replace);

        let result = exec.execute(&plan, &mut state).await.unwrap();

        assert!(result.all_successful());
        let record = state.get_run("web").unwrap();
        assert_ne!(record.state.id, first_id);
        assert_eq!(record.trigger_hash, plan.actions[0].trigger_hash.clone().unwrap());
    }

    #[tokio::test]
    async fn test_failed_update_keeps_prior_record() {
        let mut manifest = Manifest {
            runs: vec![declaration("web", &[])],
            ..Manifest::default()
        };
        let mut state = ProviderState::new();
        executor(runner_failing("none"))
            .execute(&plan_for(&manifest, &state), &mut state)
            .await
            .unwrap();
        let before = state.get_run("web").unwrap().clone();

        manifest.runs[0].config.playbook_file = String::from("broken.yml");
        let result = executor(runner_failing("broken.yml"))
            .execute(&plan_for(&manifest, &state), &mut state)
            .await
            .unwrap();

        assert_eq!(result.failed, 1);
        assert_eq!(state.get_run("web"), Some(&before));
    }

    #[tokio::test]
    async fn test_destroy_never_runs_playbooks() {
        let manifest = Manifest {
            runs: vec![declaration("base", &[]), declaration("web", &["base"])],
            ..Manifest::default()
        };
        let mut state = ProviderState::new();
        executor(runner_failing("none"))
            .execute(&plan_for(&manifest, &state), &mut state)
            .await
            .unwrap();

        let mut runner = MockPlaybookRunner::new();
        runner.expect_run().never();
        let result = executor(runner)
            .execute(&ApplyPlan::destroy(&state), &mut state)
            .await
            .unwrap();

        assert_eq!(result.successful, 2);
        assert!(state.runs.is_empty());
        let order: Vec<&str> = result.results.iter().map(|r| r.action.name.as_str()).collect();
        assert_eq!(order, ["web", "base"]);
    }

    #[tokio::test]
    async fn test_cancelled_plan_applies_nothing() {
        let manifest = Manifest {
            runs: vec![declaration("web", &[])],
            ..Manifest::default()
        };
        let mut state = ProviderState::new();
        let source = CancelSource::new();
        source.cancel();

        let mut runner = MockPlaybookRunner::new();
        runner.expect_run().never();
        let result = executor(runner)
            .with_cancel(source.token())
            .execute(&plan_for(&manifest, &state), &mut state)
            .await
            .unwrap();

        assert_eq!(result.skipped, 1);
        assert!(state.runs.is_empty());
    }

    #[tokio::test]
    async fn test_state_saved_to_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = Arc::new(LocalStateStore::with_base_dir(dir.path()));
        let manifest = Manifest {
            runs: vec![declaration("web", &[])],
            ..Manifest::default()
        };
        let mut state = ProviderState::new();

        executor(runner_failing("none"))
            .with_store(store.clone())
            .execute(&plan_for(&manifest, &state), &mut state)
            .await
            .unwrap();

        let saved = store.load().await.unwrap().unwrap();
        assert_eq!(saved.runs, state.runs);
    }

    #[tokio::test]
    async fn test_refresh_keeps_state_on_error() {
        let mut state = ProviderState::new();
        let good = RunState::created(RunConfig::new(vec![String::from("h")], "p.yml"), chrono::Utc::now());
        let bad = RunState::created(
            RunConfig::new(vec![String::from("h")], "p.yml").with_extra_vars("not json"),
            chrono::Utc::now(),
        );
        state.set_run("good", RunRecord::new(good, "c", "t", Vec::new()));
        state.set_run("bad", RunRecord::new(bad.clone(), "c", "t", Vec::new()));

        let mut runner = MockPlaybookRunner::new();
        runner.expect_run().never();
        let reports = executor(runner).with_parallelism(1).refresh(&mut state).await.unwrap();

        let bad_report = reports.iter().find(|r| r.name == "bad").unwrap();
        assert!(!bad_report.success);
        assert!(reports.iter().find(|r| r.name == "good").unwrap().success);
        assert_eq!(state.get_run("bad").unwrap().state, bad);
    }
}
