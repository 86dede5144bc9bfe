//! The `ansible_playbook` run resource.
//!
//! This module maps lifecycle operations onto playbook invocations:
//! - Create and update run the playbook and stamp the result
//! - Read validates persisted attributes without side effects by default
//! - Delete only forgets the resource

mod lifecycle;
mod model;

pub use lifecycle::{Applied, Operation, OperationResponse, RunResource};
pub use model::RunState;
