//! Inventory document encoding and materialization.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::InventoryError;

use super::host::{HostAttributes, HostSpec};

/// Inventory argument telling `ansible-playbook` to read standard input.
pub const STDIN_INVENTORY_MARKER: &str = "-";

/// How the inventory document reaches the playbook process.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum InventoryMode {
    /// Written to a temporary file that is removed after the run.
    #[default]
    File,
    /// Piped through the process's standard input.
    Stdin,
}

/// The aggregate host set of a run.
///
/// Hosts are keyed by address; when an address appears more than once the
/// last entry wins. Keys are kept sorted so the encoded document is stable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inventory {
    hosts: BTreeMap<String, HostAttributes>,
}

/// Serialized shape: `all: { hosts: { <address>: { ... } } }`.
#[derive(Serialize)]
struct InventoryDocument<'a> {
    all: HostGroup<'a>,
}

#[derive(Serialize)]
struct HostGroup<'a> {
    hosts: &'a BTreeMap<String, HostAttributes>,
}

/// A materialized inventory, alive for the duration of one invocation.
#[derive(Debug)]
pub enum InventorySource {
    /// Temporary file, deleted when this value is dropped.
    File(NamedTempFile),
    /// Document to stream on standard input.
    Stdin(String),
}

impl Inventory {
    /// Creates an empty inventory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses every host entry into an inventory.
    ///
    /// Parsing stops at the first malformed entry; no partial inventory is
    /// produced.
    ///
    /// # Errors
    ///
    /// Returns the first host parse error encountered.
    pub fn from_specs<S: AsRef<str>>(specs: &[S]) -> Result<Self, InventoryError> {
        let mut inventory = Self::new();
        for spec in specs {
            inventory.insert(HostSpec::parse(spec.as_ref())?);
        }
        Ok(inventory)
    }

    /// Adds a host, replacing any earlier entry for the same address.
    pub fn insert(&mut self, host: HostSpec) {
        if self.hosts.insert(host.address.clone(), host.attributes).is_some() {
            debug!("Host '{}' listed more than once, keeping last entry", host.address);
        }
    }

    /// Returns the attributes of a host.
    #[must_use]
    pub fn get(&self, address: &str) -> Option<&HostAttributes> {
        self.hosts.get(address)
    }

    /// Returns the number of distinct hosts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// Returns true if there are no hosts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Encodes the inventory as a YAML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be serialized.
    pub fn encode(&self) -> Result<String, InventoryError> {
        let document = InventoryDocument {
            all: HostGroup { hosts: &self.hosts },
        };
        serde_yaml::to_string(&document).map_err(|e| InventoryError::Encode {
            message: e.to_string(),
        })
    }

    /// Encodes the inventory and makes it available according to `mode`.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or the temporary file cannot be
    /// created or written.
    pub fn materialize(&self, mode: InventoryMode) -> Result<InventorySource, InventoryError> {
        let document = self.encode()?;

        match mode {
            InventoryMode::File => {
                let mut file = tempfile::Builder::new()
                    .prefix("inventory-")
                    .suffix(".yml")
                    .tempfile()
                    .map_err(|source| InventoryError::Write { source })?;

                file.write_all(document.as_bytes())
                    .and_then(|()| file.flush())
                    .map_err(|source| InventoryError::Write { source })?;

                debug!("Wrote inventory to {}", file.path().display());
                Ok(InventorySource::File(file))
            }
            InventoryMode::Stdin => Ok(InventorySource::Stdin(document)),
        }
    }
}

impl InventorySource {
    /// Value passed to `-i`.
    #[must_use]
    pub fn argument(&self) -> OsString {
        match self {
            Self::File(file) => file.path().as_os_str().to_os_string(),
            Self::Stdin(_) => OsString::from(STDIN_INVENTORY_MARKER),
        }
    }

    /// Path of the temporary file, if file based.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File(file) => Some(file.path()),
            Self::Stdin(_) => None,
        }
    }

    /// Document to write to the process's standard input, if any.
    #[must_use]
    pub fn stdin_payload(&self) -> Option<&str> {
        match self {
            Self::File(_) => None,
            Self::Stdin(document) => Some(document),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_duplicate_address_last_wins() {
        let inventory = Inventory::from_specs(&[
            r#"10.0.0.1 {"role":"old"}"#,
            "10.0.0.2",
            r#"10.0.0.1 {"role":"new"}"#,
        ])
        .unwrap();

        assert_eq!(inventory.len(), 2);
        assert_eq!(inventory.get("10.0.0.1").unwrap()["role"], json!("new"));
    }

    #[test]
    fn test_malformed_entry_aborts() {
        let result = Inventory::from_specs(&["10.0.0.1", "10.0.0.2 {oops"]);
        assert!(matches!(
            result,
            Err(InventoryError::MalformedHostAttributes { ref address, .. }) if address == "10.0.0.2"
        ));
    }

    #[test]
    fn test_encode_shape() {
        let inventory =
            Inventory::from_specs(&[r#"127.0.0.1 {"ansible_connection":"local"}"#, "web"]).unwrap();
        let encoded = inventory.encode().unwrap();

        let decoded: serde_yaml::Value = serde_yaml::from_str(&encoded).unwrap();
        let hosts = &decoded["all"]["hosts"];
        assert_eq!(
            hosts["127.0.0.1"]["ansible_connection"],
            serde_yaml::Value::from("local")
        );
        assert!(hosts["web"].as_mapping().is_some_and(serde_yaml::Mapping::is_empty));
    }

    #[test]
    fn test_encode_is_order_independent() {
        let a = Inventory::from_specs(&["b", "a", "c"]).unwrap().encode().unwrap();
        let b = Inventory::from_specs(&["c", "b", "a"]).unwrap().encode().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_materialize_file_is_removed_on_drop() {
        let inventory = Inventory::from_specs(&["10.0.0.1"]).unwrap();
        let source = inventory.materialize(InventoryMode::File).unwrap();

        let path = source.path().unwrap().to_path_buf();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("10.0.0.1"));
        assert_eq!(source.argument(), path.clone().into_os_string());
        assert!(source.stdin_payload().is_none());

        drop(source);
        assert!(!path.exists());
    }

    #[test]
    fn test_materialize_stdin() {
        let inventory = Inventory::from_specs(&["10.0.0.1"]).unwrap();
        let source = inventory.materialize(InventoryMode::Stdin).unwrap();

        assert_eq!(source.argument(), OsString::from(STDIN_INVENTORY_MARKER));
        assert!(source.stdin_payload().unwrap().contains("10.0.0.1"));
        assert!(source.path().is_none());
    }
}
