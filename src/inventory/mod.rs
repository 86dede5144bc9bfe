//! Inventory generation for playbook runs.
//!
//! This module turns the `hosts` attribute of a run into the inventory
//! document handed to `ansible-playbook`:
//! - Parsing `<address>[ <json-object>]` host entries
//! - Building the `all.hosts` inventory mapping (last entry wins)
//! - Materializing the document as a scoped temp file or a stdin payload

mod document;
mod host;

pub use document::{Inventory, InventoryMode, InventorySource, STDIN_INVENTORY_MARKER};
pub use host::{HostAttributes, HostSpec};
