//! Apply plan types and construction.
//!
//! This module turns a diff into ordered actions. Dependencies are expressed
//! by run name: a create, update or replace waits for the planned actions of
//! the runs it depends on, and a delete waits for the deletes of the runs
//! that depended on it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;

use crate::config::{Manifest, RunDeclaration};
use crate::state::ProviderState;

use super::diff::{DiffResult, DiffType};

/// A complete apply plan.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyPlan {
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// Planned actions.
    pub actions: Vec<PlannedAction>,
    /// Runs that are already up to date.
    pub unchanged: Vec<String>,
}

/// A single planned action.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedAction {
    /// Action type.
    pub action_type: ActionType,
    /// Run name.
    pub name: String,
    /// Declaration to apply (absent for deletes).
    #[serde(skip)]
    pub declaration: Option<RunDeclaration>,
    /// Reason for this action.
    pub reason: String,
    /// Attribute hash to record on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,
    /// Trigger hash to record on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_hash: Option<String>,
    /// Runs whose actions in this plan must succeed first.
    pub depends_on: Vec<String>,
}

/// Types of actions in a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    /// Run the playbook and record a new resource.
    Create,
    /// Run the playbook again, keeping the resource id.
    Update,
    /// Forget the resource, then create it again.
    Replace,
    /// Forget the resource.
    Delete,
}

impl ApplyPlan {
    /// Creates a new plan from a diff result.
    #[must_use]
    pub fn from_diff(diff: &DiffResult, manifest: &Manifest, state: Option<&ProviderState>) -> Self {
        let mut actions = Vec::new();
        let mut unchanged = Vec::new();

        for resource_diff in &diff.diffs {
            let action_type = match resource_diff.diff_type {
                DiffType::Create => ActionType::Create,
                DiffType::Update => ActionType::Update,
                DiffType::Replace => ActionType::Replace,
                DiffType::Delete => ActionType::Delete,
                DiffType::NoChange => {
                    unchanged.push(resource_diff.name.clone());
                    continue;
                }
            };

            let declaration = manifest.get_run(&resource_diff.name).cloned();
            let reason = match action_type {
                ActionType::Create => String::from("Run declared but never applied"),
                ActionType::Update => format!("Changed: {}", fields(resource_diff)),
                ActionType::Replace if resource_diff.details.iter().any(|d| d.field == "triggers") => {
                    String::from("Triggers changed")
                }
                ActionType::Replace => String::from("Replacement requested"),
                ActionType::Delete => String::from("Run removed from manifest"),
            };

            actions.push(PlannedAction {
                action_type,
                name: resource_diff.name.clone(),
                declaration,
                reason,
                config_hash: resource_diff.new_hash.clone(),
                trigger_hash: resource_diff.trigger_hash.clone(),
                depends_on: Vec::new(),
            });
        }

        let mut plan = Self {
            created_at: Utc::now(),
            actions,
            unchanged,
        };
        plan.link_dependencies(state);
        plan
    }

    /// Creates a plan that deletes every recorded run.
    #[must_use]
    pub fn destroy(state: &ProviderState) -> Self {
        let actions = state
            .runs
            .keys()
            .map(|name| PlannedAction {
                action_type: ActionType::Delete,
                name: name.clone(),
                declaration: None,
                reason: String::from("Destroy requested"),
                config_hash: None,
                trigger_hash: None,
                depends_on: Vec::new(),
            })
            .collect();

        let mut plan = Self {
            created_at: Utc::now(),
            actions,
            unchanged: Vec::new(),
        };
        plan.link_dependencies(Some(state));
        plan
    }

    /// Fills in `depends_on` from declarations and recorded dependencies.
    fn link_dependencies(&mut self, state: Option<&ProviderState>) {
        let applying: HashSet<String> = self
            .actions
            .iter()
            .filter(|a| a.action_type != ActionType::Delete)
            .map(|a| a.name.clone())
            .collect();
        let deleting: HashSet<String> = self
            .actions
            .iter()
            .filter(|a| a.action_type == ActionType::Delete)
            .map(|a| a.name.clone())
            .collect();

        for action in &mut self.actions {
            action.depends_on = match action.action_type {
                ActionType::Delete => {
                    // Dependents go first
                    let mut dependents: Vec<String> = state
                        .map(|s| {
                            s.runs
                                .iter()
                                .filter(|(name, record)| {
                                    deleting.contains(*name) && record.depends_on.contains(&action.name)
                                })
                                .map(|(name, _)| name.clone())
                                .collect()
                        })
                        .unwrap_or_default();
                    dependents.sort();
                    dependents
                }
                _ => action
                    .declaration
                    .as_ref()
                    .map(|d| {
                        d.depends_on
                            .iter()
                            .filter(|dep| applying.contains(*dep))
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default(),
            };
        }
    }

    /// Returns true if the plan is empty (no changes).
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Returns the number of actions.
    #[must_use]
    pub const fn action_count(&self) -> usize {
        self.actions.len()
    }

    /// Returns the number of actions of a type.
    #[must_use]
    pub fn count(&self, action_type: ActionType) -> usize {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .count()
    }

    /// Gets the action for a run.
    #[must_use]
    pub fn get_action(&self, name: &str) -> Option<&PlannedAction> {
        self.actions.iter().find(|a| a.name == name)
    }
}

fn fields(diff: &super::diff::ResourceDiff) -> String {
    if diff.details.is_empty() {
        return String::from("attributes");
    }
    diff.details
        .iter()
        .map(|d| d.field.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl PlannedAction {
    /// Returns a human-readable description of the action.
    #[must_use]
    pub fn description(&self) -> String {
        match self.action_type {
            ActionType::Create => format!("Create run '{}'", self.name),
            ActionType::Update => format!("Update run '{}'", self.name),
            ActionType::Replace => format!("Replace run '{}'", self.name),
            ActionType::Delete => format!("Delete run '{}'", self.name),
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.action_type, self.name)?;
        if !self.reason.is_empty() {
            write!(f, " ({})", self.reason)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for ApplyPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.actions.is_empty() {
            return write!(f, "No changes required");
        }

        writeln!(f, "Apply Plan ({} actions):", self.actions.len())?;
        for (i, action) in self.actions.iter().enumerate() {
            writeln!(f, "  {}. {action}", i + 1)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::planner::DiffEngine;
    use crate::resource::RunState;
    use crate::state::RunRecord;

    fn declaration(name: &str, depends_on: &[&str]) -> RunDeclaration {
        RunDeclaration {
            name: name.to_string(),
            config: RunConfig::new(vec![String::from("10.0.0.1")], format!("{name}.yml")),
            depends_on: depends_on.iter().map(|d| (*d).to_string()).collect(),
            ..RunDeclaration::default()
        }
    }

    fn record(depends_on: &[&str]) -> RunRecord {
        RunRecord::new(
            RunState::created(RunConfig::new(vec![String::from("h")], "p.yml"), Utc::now()),
            "c",
            "t",
            depends_on.iter().map(|d| (*d).to_string()).collect(),
        )
    }

    #[test]
    fn test_plan_from_diff_links_dependencies() {
        let manifest = Manifest {
            runs: vec![declaration("base", &[]), declaration("web", &["base"])],
            ..Manifest::default()
        };
        let diff = DiffEngine::new().compute_diff(&manifest, None, &[]).unwrap();

        let plan = ApplyPlan::from_diff(&diff, &manifest, None);

        assert_eq!(plan.count(ActionType::Create), 2);
        assert!(plan.get_action("base").unwrap().depends_on.is_empty());
        assert_eq!(plan.get_action("web").unwrap().depends_on, ["base"]);
        assert!(plan.get_action("web").unwrap().declaration.is_some());
    }

    #[test]
    fn test_unchanged_dependency_is_not_waited_for() {
        let engine = DiffEngine::new();
        let base = declaration("base", &[]);
        let mut state = ProviderState::new();
        state.set_run(
            "base",
            RunRecord::new(
                RunState::created(base.config.clone(), Utc::now()),
                engine.config_hash(&base.config),
                engine.trigger_hash(&base).unwrap(),
                Vec::new(),
            ),
        );
        let manifest = Manifest {
            runs: vec![base, declaration("web", &["base"])],
            ..Manifest::default()
        };
        let diff = engine.compute_diff(&manifest, Some(&state), &[]).unwrap();

        let plan = ApplyPlan::from_diff(&diff, &manifest, Some(&state));

        assert_eq!(plan.unchanged, ["base"]);
        assert_eq!(plan.action_count(), 1);
        assert!(plan.get_action("web").unwrap().depends_on.is_empty());
    }

    #[test]
    fn test_destroy_deletes_dependents_first() {
        let mut state = ProviderState::new();
        state.set_run("base", record(&[]));
        state.set_run("web", record(&["base"]));

        let plan = ApplyPlan::destroy(&state);

        assert_eq!(plan.count(ActionType::Delete), 2);
        assert_eq!(plan.get_action("base").unwrap().depends_on, ["web"]);
        assert!(plan.get_action("web").unwrap().depends_on.is_empty());
    }

    #[test]
    fn test_empty_plan_display() {
        let plan = ApplyPlan::destroy(&ProviderState::new());
        assert!(plan.is_empty());
        assert_eq!(plan.to_string(), "No changes required");
    }
}
