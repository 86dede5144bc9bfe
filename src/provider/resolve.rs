//! Binary lookup and option resolution.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{ProviderConfig, ReadPolicy};
use crate::error::{ProviderError, Result};
use crate::inventory::InventoryMode;

/// Executable searched for on `PATH` when no binary is configured.
pub const DEFAULT_PLAYBOOK_BINARY: &str = "ansible-playbook";

/// Provider options after resolution. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    /// Absolute or configured path of the playbook binary.
    pub binary: PathBuf,
    /// Verbosity level (0 = silent).
    pub verbosity: u8,
    /// How inventories reach the process.
    pub inventory_mode: InventoryMode,
    /// What a read does.
    pub read_policy: ReadPolicy,
    /// Per-invocation time limit.
    pub timeout: Option<Duration>,
    /// Working directory for invocations; relative playbook paths resolve here.
    pub working_dir: Option<PathBuf>,
}

/// Resolves a [`ProviderConfig`] into a [`ResolvedConfig`].
#[derive(Debug, Default)]
pub struct ProviderResolver {
    working_dir: Option<PathBuf>,
    search_path: Option<OsString>,
}

impl ProviderResolver {
    /// Creates a resolver that searches the process `PATH`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            working_dir: None,
            search_path: None,
        }
    }

    /// Sets the working directory for every invocation.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Searches `paths` instead of the process `PATH`.
    #[must_use]
    pub fn with_search_path(mut self, paths: impl Into<OsString>) -> Self {
        self.search_path = Some(paths.into());
        self
    }

    /// Resolves the binary and global options.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::BinaryNotFound`] if no binary is configured
    /// and none is on the search path, or [`ProviderError::BinaryNotStatable`]
    /// if the configured binary cannot be stat'd.
    pub fn configure(&self, config: &ProviderConfig) -> Result<ResolvedConfig> {
        let binary = match &config.ansible_playbook_binary {
            Some(explicit) => {
                let path = PathBuf::from(explicit);
                std::fs::metadata(&path).map_err(|source| ProviderError::BinaryNotStatable {
                    path: path.clone(),
                    source,
                })?;
                debug!("Using configured binary {}", path.display());
                path
            }
            None => self.lookup()?,
        };

        let resolved = ResolvedConfig {
            binary,
            verbosity: config.verbosity.unwrap_or(0),
            inventory_mode: config.inventory_mode,
            read_policy: config.read_policy,
            timeout: config.timeout_secs.map(Duration::from_secs),
            working_dir: self.working_dir.clone(),
        };

        info!(
            "Provider configured: binary={}, verbosity={}, read_policy={}",
            resolved.binary.display(),
            resolved.verbosity,
            resolved.read_policy
        );
        Ok(resolved)
    }

    fn lookup(&self) -> std::result::Result<PathBuf, ProviderError> {
        let found = match &self.search_path {
            Some(paths) => {
                let cwd = self
                    .working_dir
                    .clone()
                    .unwrap_or_else(|| PathBuf::from("."));
                which::which_in(DEFAULT_PLAYBOOK_BINARY, Some(paths), cwd)
            }
            None => which::which(DEFAULT_PLAYBOOK_BINARY),
        };

        found.map_err(|source| ProviderError::BinaryNotFound {
            name: DEFAULT_PLAYBOOK_BINARY.to_string(),
            source,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::AnsiblePlayError;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn fake_binary(dir: &TempDir) -> PathBuf {
        let path = dir.path().join(DEFAULT_PLAYBOOK_BINARY);
        std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_lookup_on_search_path() {
        let dir = TempDir::new().unwrap();
        let expected = fake_binary(&dir);

        let resolved = ProviderResolver::new()
            .with_search_path(dir.path().as_os_str())
            .configure(&ProviderConfig::default())
            .unwrap();

        assert_eq!(resolved.binary, expected);
        assert_eq!(resolved.verbosity, 0);
        assert_eq!(resolved.read_policy, ReadPolicy::Inert);
        assert_eq!(resolved.timeout, None);
    }

    #[test]
    fn test_lookup_failure() {
        let dir = TempDir::new().unwrap();

        let err = ProviderResolver::new()
            .with_search_path(dir.path().as_os_str())
            .configure(&ProviderConfig::default())
            .unwrap_err();

        assert!(matches!(
            err,
            AnsiblePlayError::Provider(ProviderError::BinaryNotFound { .. })
        ));
        assert!(err.to_string().contains("ansible-playbook binary not found in PATH"));
    }

    #[test]
    fn test_explicit_binary() {
        let dir = TempDir::new().unwrap();
        let binary = fake_binary(&dir);
        let config = ProviderConfig {
            ansible_playbook_binary: Some(binary.display().to_string()),
            verbosity: Some(2),
            timeout_secs: Some(60),
            ..ProviderConfig::default()
        };

        let resolved = ProviderResolver::new()
            .with_working_dir(dir.path())
            .configure(&config)
            .unwrap();

        assert_eq!(resolved.binary, binary);
        assert_eq!(resolved.verbosity, 2);
        assert_eq!(resolved.timeout, Some(Duration::from_secs(60)));
        assert_eq!(resolved.working_dir.as_deref(), Some(dir.path()));
    }

    #[test]
    fn test_explicit_binary_missing() {
        let config = ProviderConfig {
            ansible_playbook_binary: Some(String::from("/nonexistent/ansible-playbook")),
            ..ProviderConfig::default()
        };

        let err = ProviderResolver::new().configure(&config).unwrap_err();
        assert!(matches!(
            err,
            AnsiblePlayError::Provider(ProviderError::BinaryNotStatable { .. })
        ));
        assert!(err.to_string().contains("could not be stat'd"));
    }
}
