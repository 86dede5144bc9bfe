//! Planning module for apply operations.
//!
//! This module handles the comparison between the manifest and recorded
//! state, generating plans and executing them through the run resource.

mod diff;
mod plan;
mod executor;

pub use diff::{DiffDetail, DiffEngine, DiffResult, DiffType, ResourceDiff};
pub use plan::{ActionType, ApplyPlan, PlannedAction};
pub use executor::{
    ActionOutcome, ActionResult, DEFAULT_PARALLELISM, ExecutionResult, PlanExecutor, RefreshReport,
};
