//! Manifest validation.
//!
//! This module validates a manifest before any plan is computed, so that
//! malformed host entries, extra variables and dependency cycles are reported
//! up front instead of half-way through an apply.

use crate::error::{AnsiblePlayError, ConfigError, Result};
use crate::inventory::HostSpec;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::spec::{Manifest, RunDeclaration};

/// Validator for manifests.
#[derive(Debug, Default)]
pub struct ManifestValidator {
    /// Directory relative playbook paths are resolved against.
    base_dir: Option<PathBuf>,
}

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ManifestValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_dir: None }
    }

    /// Sets the directory relative playbook paths are checked against.
    #[must_use]
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Collects every problem in the manifest without failing.
    #[must_use]
    pub fn check(&self, manifest: &Manifest) -> ValidationResult {
        let mut result = ValidationResult::default();

        let mut seen = HashSet::new();
        for (index, run) in manifest.runs.iter().enumerate() {
            if !seen.insert(run.name.as_str()) {
                result.errors.push(ValidationError {
                    field: format!("runs[{index}].name"),
                    message: ConfigError::DuplicateName {
                        name: run.name.clone(),
                    }
                    .to_string(),
                });
            }
            self.validate_run(index, run, &seen_names(manifest), &mut result);
        }

        if let Some(cycle) = find_cycle(manifest) {
            result.errors.push(ValidationError {
                field: String::from("runs"),
                message: ConfigError::CircularDependency { cycle }.to_string(),
            });
        }

        if manifest.runs.is_empty() {
            result
                .warnings
                .push(String::from("Manifest declares no runs"));
        }

        result
    }

    /// Validates a manifest.
    ///
    /// # Errors
    ///
    /// Returns the first validation error found.
    pub fn validate(&self, manifest: &Manifest) -> Result<ValidationResult> {
        let result = self.check(manifest);

        match result.errors.first() {
            None => {
                debug!("Manifest validation passed");
                Ok(result)
            }
            Some(first_error) => Err(AnsiblePlayError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            })),
        }
    }

    /// Validates a single run declaration.
    fn validate_run(
        &self,
        index: usize,
        run: &RunDeclaration,
        names: &HashSet<&str>,
        result: &mut ValidationResult,
    ) {
        let prefix = format!("runs[{index}]");

        if !is_valid_name(&run.name) {
            result.errors.push(ValidationError {
                field: format!("{prefix}.name"),
                message: format!(
                    "Run name '{}' is invalid. Must start with a letter and contain only lowercase alphanumerics, '-' or '_'.",
                    run.name
                ),
            });
        }

        if run.config.hosts.is_empty() {
            result.errors.push(ValidationError {
                field: format!("{prefix}.hosts"),
                message: format!("Run '{}' must list at least one host", run.name),
            });
        }

        for (host_index, host) in run.config.hosts.iter().enumerate() {
            if let Err(e) = HostSpec::parse(host) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.hosts[{host_index}]"),
                    message: e.to_string(),
                });
            }
        }

        if run.config.playbook_file.trim().is_empty() {
            result.errors.push(ValidationError {
                field: format!("{prefix}.playbook_file"),
                message: format!("Run '{}' must set playbook_file", run.name),
            });
        } else if !self.resolve(&run.config.playbook_file).exists() {
            result.warnings.push(format!(
                "Playbook '{}' of run '{}' does not exist yet",
                run.config.playbook_file, run.name
            ));
        }

        if let Some(extra_vars) = &run.config.extra_vars_json {
            if let Err(e) = serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(extra_vars) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.extra_vars_json"),
                    message: format!("extra_vars_json must be a JSON object: {e}"),
                });
            }
        }

        for dependency in &run.depends_on {
            if dependency == &run.name {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.depends_on"),
                    message: format!("Run '{}' cannot depend on itself", run.name),
                });
            } else if !names.contains(dependency.as_str()) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.depends_on"),
                    message: format!(
                        "Run '{}' depends on unknown run '{dependency}'",
                        run.name
                    ),
                });
            }
        }
    }

    /// Resolves a playbook path against the base directory.
    fn resolve(&self, playbook: &str) -> PathBuf {
        let path = Path::new(playbook);
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl ValidationResult {
    /// Returns true if no errors were found.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// All declared run names.
fn seen_names(manifest: &Manifest) -> HashSet<&str> {
    manifest.runs.iter().map(|r| r.name.as_str()).collect()
}

/// Finds a dependency cycle, rendered as `a -> b -> a`.
fn find_cycle(manifest: &Manifest) -> Option<String> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit<'a>(
        name: &'a str,
        edges: &HashMap<&'a str, Vec<&'a str>>,
        marks: &mut HashMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
    ) -> Option<String> {
        match marks.get(name) {
            Some(Mark::Done) => return None,
            Some(Mark::Visiting) => {
                let start = path.iter().position(|n| *n == name).unwrap_or(0);
                let mut cycle: Vec<&str> = path[start..].to_vec();
                cycle.push(name);
                return Some(cycle.join(" -> "));
            }
            None => {}
        }

        marks.insert(name, Mark::Visiting);
        path.push(name);
        for next in edges.get(name).into_iter().flatten() {
            if let Some(cycle) = visit(next, edges, marks, path) {
                return Some(cycle);
            }
        }
        path.pop();
        marks.insert(name, Mark::Done);
        None
    }

    let edges: HashMap<&str, Vec<&str>> = manifest
        .runs
        .iter()
        .map(|r| {
            (
                r.name.as_str(),
                r.depends_on
                    .iter()
                    .map(String::as_str)
                    .filter(|d| *d != r.name)
                    .collect(),
            )
        })
        .collect();

    let mut marks = HashMap::new();
    for run in &manifest.runs {
        let mut path = Vec::new();
        if let Some(cycle) = visit(&run.name, &edges, &mut marks, &mut path) {
            return Some(cycle);
        }
    }
    None
}

/// Checks if a run name is valid.
///
/// Valid names start with a lowercase letter and contain only lowercase
/// letters, digits, hyphens and underscores.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}
