//! Diff engine for comparing the manifest against recorded state.
//!
//! Every declared run is classified as create, update, replace or unchanged;
//! every recorded run that is no longer declared is a delete.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::{ConfigHasher, Manifest, RunConfig, RunDeclaration};
use crate::error::{AnsiblePlayError, ConfigError, PlanError, Result};
use crate::state::{ProviderState, RunRecord};

/// Engine for computing diffs between desired and recorded states.
#[derive(Debug, Default)]
pub struct DiffEngine {
    /// Configuration hasher.
    hasher: ConfigHasher,
    /// Directory relative playbook paths resolve against.
    base_dir: Option<PathBuf>,
}

/// Difference for a single run.
#[derive(Debug, Clone)]
pub struct ResourceDiff {
    /// Run name.
    pub name: String,
    /// Type of difference.
    pub diff_type: DiffType,
    /// Details about the difference.
    pub details: Vec<DiffDetail>,
    /// Recorded attribute hash (if any).
    pub old_hash: Option<String>,
    /// Desired attribute hash (absent for deletes).
    pub new_hash: Option<String>,
    /// Desired trigger hash (absent for deletes).
    pub trigger_hash: Option<String>,
}

/// Type of difference detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffType {
    /// Run has never been applied.
    Create,
    /// Attributes changed; run the playbook again in place.
    Update,
    /// A trigger changed or replacement was requested.
    Replace,
    /// Run is no longer declared.
    Delete,
    /// Run is up to date.
    NoChange,
}

/// Detail about a specific difference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffDetail {
    /// Field that differs.
    pub field: String,
    /// Old value.
    pub old_value: Option<String>,
    /// New value.
    pub new_value: Option<String>,
}

/// Complete diff result.
#[derive(Debug)]
pub struct DiffResult {
    /// All run diffs, declared runs first in manifest order.
    pub diffs: Vec<ResourceDiff>,
    /// Number of runs to create.
    pub creates: usize,
    /// Number of runs to update in place.
    pub updates: usize,
    /// Number of runs to replace.
    pub replaces: usize,
    /// Number of runs to delete.
    pub deletes: usize,
    /// Number of unchanged runs.
    pub unchanged: usize,
}

impl DiffEngine {
    /// Creates a new diff engine.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            hasher: ConfigHasher::new(),
            base_dir: None,
        }
    }

    /// Sets the directory relative playbook paths resolve against.
    #[must_use]
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Computes the trigger hash of a declared run.
    ///
    /// # Errors
    ///
    /// Returns an error if the run replaces on playbook changes and the
    /// playbook cannot be read.
    pub fn trigger_hash(&self, run: &RunDeclaration) -> Result<String> {
        let digest = if run.replace_on_playbook_change {
            let path = self.resolve(&run.config.playbook_file);
            let digest = self.hasher.hash_file(&path).map_err(|e| {
                AnsiblePlayError::Config(ConfigError::validation(
                    format!("cannot hash playbook '{}': {e}", path.display()),
                    format!("runs.{}.playbook_file", run.name),
                ))
            })?;
            Some(digest)
        } else {
            None
        };

        Ok(self.hasher.hash_triggers(run, digest.as_deref()))
    }

    /// Computes the attribute hash of a run configuration.
    #[must_use]
    pub fn config_hash(&self, config: &RunConfig) -> String {
        self.hasher.hash_run(config)
    }

    /// Computes the diff between the manifest and recorded state.
    ///
    /// Runs named in `force_replace` are replaced even when unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if a forced run is not declared, or a playbook that
    /// takes part in a trigger cannot be read.
    pub fn compute_diff(
        &self,
        manifest: &Manifest,
        state: Option<&ProviderState>,
        force_replace: &[String],
    ) -> Result<DiffResult> {
        let mut diffs = Vec::new();
        let forced: HashSet<&str> = force_replace.iter().map(String::as_str).collect();
        if let Some(name) = forced.iter().find(|name| manifest.get_run(name).is_none()) {
            return Err(PlanError::UnknownRun {
                name: (*name).to_string(),
            }
            .into());
        }

        for run in &manifest.runs {
            let new_hash = self.config_hash(&run.config);
            let trigger_hash = self.trigger_hash(run)?;
            let record = state.and_then(|s| s.get_run(&run.name));

            let diff = Self::compute_run_diff(
                run,
                record,
                new_hash,
                trigger_hash,
                forced.contains(run.name.as_str()),
            );
            diffs.push(diff);
        }

        if let Some(state) = state {
            for (name, record) in &state.runs {
                if manifest.get_run(name).is_none() {
                    debug!("Run {name} is no longer declared");
                    diffs.push(ResourceDiff {
                        name: name.clone(),
                        diff_type: DiffType::Delete,
                        details: vec![DiffDetail {
                            field: String::from("id"),
                            old_value: Some(record.state.id_string()),
                            new_value: None,
                        }],
                        old_hash: Some(record.config_hash.clone()),
                        new_hash: None,
                        trigger_hash: None,
                    });
                }
            }
        }

        let count = |t: DiffType| diffs.iter().filter(|d| d.diff_type == t).count();
        let creates = count(DiffType::Create);
        let updates = count(DiffType::Update);
        let replaces = count(DiffType::Replace);
        let deletes = count(DiffType::Delete);
        let unchanged = count(DiffType::NoChange);

        Ok(DiffResult {
            diffs,
            creates,
            updates,
            replaces,
            deletes,
            unchanged,
        })
    }

    /// Computes the diff for a single declared run.
    fn compute_run_diff(
        run: &RunDeclaration,
        record: Option<&RunRecord>,
        new_hash: String,
        trigger_hash: String,
        forced: bool,
    ) -> ResourceDiff {
        let Some(record) = record else {
            debug!("Run {} needs to be created", run.name);
            return ResourceDiff {
                name: run.name.clone(),
                diff_type: DiffType::Create,
                details: vec![DiffDetail {
                    field: String::from("playbook_file"),
                    old_value: None,
                    new_value: Some(run.config.playbook_file.clone()),
                }],
                old_hash: None,
                new_hash: Some(new_hash),
                trigger_hash: Some(trigger_hash),
            };
        };

        let mut details = Self::compute_detailed_diff(&record.state.attributes, &run.config);
        let triggers_changed = record.trigger_hash != trigger_hash;

        let diff_type = if forced || triggers_changed {
            if triggers_changed {
                details.push(DiffDetail {
                    field: String::from("triggers"),
                    old_value: Some(short(&record.trigger_hash)),
                    new_value: Some(short(&trigger_hash)),
                });
            }
            DiffType::Replace
        } else if record.config_hash != new_hash {
            DiffType::Update
        } else {
            DiffType::NoChange
        };

        debug!("Run {} diff: {}", run.name, diff_type);
        ResourceDiff {
            name: run.name.clone(),
            diff_type,
            details,
            old_hash: Some(record.config_hash.clone()),
            new_hash: Some(new_hash),
            trigger_hash: Some(trigger_hash),
        }
    }

    /// Computes field-level differences between recorded and desired
    /// attributes.
    fn compute_detailed_diff(old: &RunConfig, new: &RunConfig) -> Vec<DiffDetail> {
        let mut details = Vec::new();

        if old.hosts != new.hosts {
            details.push(DiffDetail {
                field: String::from("hosts"),
                old_value: Some(old.hosts.join(", ")),
                new_value: Some(new.hosts.join(", ")),
            });
        }

        if old.playbook_file != new.playbook_file {
            details.push(DiffDetail {
                field: String::from("playbook_file"),
                old_value: Some(old.playbook_file.clone()),
                new_value: Some(new.playbook_file.clone()),
            });
        }

        if old.extra_vars_json != new.extra_vars_json {
            details.push(DiffDetail {
                field: String::from("extra_vars_json"),
                old_value: old.extra_vars_json.clone(),
                new_value: new.extra_vars_json.clone(),
            });
        }

        details
    }

    fn resolve(&self, playbook: &str) -> PathBuf {
        let path = Path::new(playbook);
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

fn short(hash: &str) -> String {
    hash.chars().take(8).collect()
}

impl DiffResult {
    /// Returns true if there are any changes.
    #[must_use]
    pub const fn has_changes(&self) -> bool {
        self.creates > 0 || self.updates > 0 || self.replaces > 0 || self.deletes > 0
    }

    /// Returns the total number of changes.
    #[must_use]
    pub const fn total_changes(&self) -> usize {
        self.creates + self.updates + self.replaces + self.deletes
    }

    /// Filters to only diffs that require action.
    #[must_use]
    pub fn actionable_diffs(&self) -> Vec<&ResourceDiff> {
        self.diffs
            .iter()
            .filter(|d| d.diff_type != DiffType::NoChange)
            .collect()
    }
}

impl std::fmt::Display for DiffType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
            Self::NoChange => "no change",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for ResourceDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.diff_type)?;
        if !self.details.is_empty() {
            write!(f, " (")?;
            for (i, detail) in self.details.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", detail.field)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::RunState;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn declaration(name: &str, playbook: &str) -> RunDeclaration {
        RunDeclaration {
            name: name.to_string(),
            config: RunConfig::new(vec![String::from("10.0.0.1")], playbook),
            ..RunDeclaration::default()
        }
    }

    fn manifest(runs: Vec<RunDeclaration>) -> Manifest {
        Manifest {
            runs,
            ..Manifest::default()
        }
    }

    /// State as it would be right after applying `runs`.
    fn applied(engine: &DiffEngine, runs: &[RunDeclaration]) -> ProviderState {
        let mut state = ProviderState::new();
        for run in runs {
            let record = RunRecord::new(
                RunState::created(run.config.clone(), Utc::now()),
                engine.config_hash(&run.config),
                engine.trigger_hash(run).unwrap(),
                run.depends_on.clone(),
            );
            state.set_run(run.name.clone(), record);
        }
        state
    }

    fn diff_type(result: &DiffResult, name: &str) -> DiffType {
        result.diffs.iter().find(|d| d.name == name).unwrap().diff_type
    }

    #[test]
    fn test_create_when_no_state() {
        let engine = DiffEngine::new();
        let m = manifest(vec![declaration("web", "site.yml")]);

        let result = engine.compute_diff(&m, None, &[]).unwrap();

        assert_eq!(result.creates, 1);
        assert_eq!(diff_type(&result, "web"), DiffType::Create);
        assert!(result.has_changes());
    }

    #[test]
    fn test_unchanged() {
        let engine = DiffEngine::new();
        let runs = vec![declaration("web", "site.yml")];
        let state = applied(&engine, &runs);

        let result = engine.compute_diff(&manifest(runs), Some(&state), &[]).unwrap();

        assert_eq!(result.unchanged, 1);
        assert!(!result.has_changes());
    }

    #[test]
    fn test_attribute_change_is_update() {
        let engine = DiffEngine::new();
        let runs = vec![declaration("web", "site.yml")];
        let state = applied(&engine, &runs);

        let mut changed = runs[0].clone();
        changed.config.extra_vars_json = Some(String::from(r#"{"release":"43"}"#));
        let result = engine
            .compute_diff(&manifest(vec![changed]), Some(&state), &[])
            .unwrap();

        assert_eq!(diff_type(&result, "web"), DiffType::Update);
        assert_eq!(result.diffs[0].details[0].field, "extra_vars_json");
    }

    #[test]
    fn test_trigger_change_is_replace() {
        let engine = DiffEngine::new();
        let runs = vec![declaration("web", "site.yml")];
        let state = applied(&engine, &runs);

        let mut changed = runs[0].clone();
        changed.triggers = BTreeMap::from([(String::from("release"), String::from("43"))]);
        let result = engine
            .compute_diff(&manifest(vec![changed]), Some(&state), &[])
            .unwrap();

        assert_eq!(diff_type(&result, "web"), DiffType::Replace);
        assert_eq!(result.replaces, 1);
    }

    #[test]
    fn test_playbook_content_change_is_replace() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("site.yml"), "- hosts: all\n").unwrap();
        let engine = DiffEngine::new().with_base_dir(dir.path());

        let mut run = declaration("web", "site.yml");
        run.replace_on_playbook_change = true;
        let runs = vec![run];
        let state = applied(&engine, &runs);

        let unchanged = engine.compute_diff(&manifest(runs.clone()), Some(&state), &[]).unwrap();
        assert_eq!(diff_type(&unchanged, "web"), DiffType::NoChange);

        std::fs::write(dir.path().join("site.yml"), "- hosts: web\n").unwrap();
        let changed = engine.compute_diff(&manifest(runs), Some(&state), &[]).unwrap();
        assert_eq!(diff_type(&changed, "web"), DiffType::Replace);
    }

    #[test]
    fn test_missing_playbook_with_content_trigger_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let engine = DiffEngine::new().with_base_dir(dir.path());
        let mut run = declaration("web", "site.yml");
        run.replace_on_playbook_change = true;

        assert!(engine.compute_diff(&manifest(vec![run]), None, &[]).is_err());
    }

    #[test]
    fn test_forced_replace() {
        let engine = DiffEngine::new();
        let runs = vec![declaration("web", "site.yml")];
        let state = applied(&engine, &runs);

        let result = engine
            .compute_diff(&manifest(runs), Some(&state), &[String::from("web")])
            .unwrap();

        assert_eq!(diff_type(&result, "web"), DiffType::Replace);
    }

    #[test]
    fn test_forced_replace_of_unknown_run() {
        let result = DiffEngine::new().compute_diff(
            &manifest(vec![declaration("web", "site.yml")]),
            None,
            &[String::from("nope")],
        );

        assert!(matches!(
            result,
            Err(AnsiblePlayError::Plan(PlanError::UnknownRun { ref name })) if name == "nope"
        ));
    }

    #[test]
    fn test_undeclared_run_is_deleted() {
        let engine = DiffEngine::new();
        let state = applied(&engine, &[declaration("web", "site.yml"), declaration("db", "db.yml")]);

        let result = engine
            .compute_diff(&manifest(vec![declaration("web", "site.yml")]), Some(&state), &[])
            .unwrap();

        assert_eq!(result.deletes, 1);
        assert_eq!(diff_type(&result, "db"), DiffType::Delete);
        assert_eq!(result.total_changes(), 1);
    }
}
