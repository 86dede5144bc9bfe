//! Configuration hashing for change detection.
//!
//! This module provides deterministic hashing of run declarations so the
//! planner can tell an in-place update from a forced replacement.

use sha2::{Digest, Sha256};
use std::path::Path;

use crate::error::Result;

use super::spec::{RunConfig, RunDeclaration};

/// Hasher for computing configuration hashes.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new configuration hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a hash of the resource attributes of a run.
    ///
    /// A change here is an in-place update.
    #[must_use]
    pub fn hash_run(&self, config: &RunConfig) -> String {
        let mut hasher = Sha256::new();

        // Host order is significant to the playbook's view of the inventory
        for host in &config.hosts {
            hasher.update(host.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update([0xffu8]);

        hasher.update(config.playbook_file.as_bytes());
        hasher.update([0u8]);

        match &config.extra_vars_json {
            Some(extra_vars) => {
                hasher.update([1u8]);
                hasher.update(extra_vars.as_bytes());
            }
            None => hasher.update([0u8]),
        }

        hex::encode(hasher.finalize())
    }

    /// Computes a hash of everything that forces a replacement.
    ///
    /// `playbook_digest` is the content hash of the playbook file, only
    /// supplied when the run opts into replacing on playbook changes.
    #[must_use]
    pub fn hash_triggers(&self, run: &RunDeclaration, playbook_digest: Option<&str>) -> String {
        let mut hasher = Sha256::new();

        // BTreeMap iteration is already sorted
        for (key, value) in &run.triggers {
            hasher.update(key.as_bytes());
            hasher.update([0u8]);
            hasher.update(value.as_bytes());
            hasher.update([0u8]);
        }

        if let Some(digest) = playbook_digest {
            hasher.update(b"playbook:");
            hasher.update(digest.as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    /// Computes the SHA-256 of a file's content.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn hash_file(&self, path: impl AsRef<Path>) -> Result<String> {
        let content = std::fs::read(path.as_ref())?;
        Ok(hex::encode(Sha256::digest(&content)))
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }
}
