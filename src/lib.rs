// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![forbid(unsafe_code)]               // Unsafe code is forbidden
#![deny(warnings)]                    // All warnings become errors
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # ansibleplay
//!
//! Declarative, lifecycle-managed `ansible-playbook` runs.
//!
//! ## Overview
//!
//! A *run* is a resource: a playbook played against a list of hosts, with
//! optional extra variables. ansibleplay gives runs a create, read, update
//! and delete lifecycle:
//!
//! - **Create** and **update** play the playbook and record a new
//!   `last_execution` timestamp; the resource id is assigned once.
//! - **Read** validates what was recorded and never changes the hosts (with
//!   the `check` read policy it also plays the playbook in `--check` mode).
//! - **Delete** forgets the run. Nothing is played.
//!
//! ## Architecture
//!
//! 1. **Manifest**: runs declared in `ansibleplay.yaml`
//! 2. **State**: what was last applied, kept in `.ansibleplay/state.json`
//! 3. **Planner**: diffs the two and applies the result through the run
//!    resource, honoring `depends_on` and bounded parallelism
//!
//! ## Modules
//!
//! - [`inventory`]: host-spec parsing and inventory documents
//! - [`runner`]: `ansible-playbook` invocation and cancellation
//! - [`provider`]: provider configuration resolution
//! - [`resource`]: the run resource lifecycle
//! - [`diagnostics`]: user-visible errors and warnings
//! - [`config`]: manifest parsing, validation and hashing
//! - [`state`]: state storage and locking
//! - [`planner`]: diff computation, planning and execution
//! - [`cli`]: command-line interface
//!
//! ## Example
//!
//! ```yaml
//! provider:
//!   verbosity: 1
//!
//! runs:
//!   - name: web
//!     hosts:
//!       - 10.0.0.20
//!       - '10.0.0.21 {"ansible_user": "deploy"}'
//!     playbook_file: playbooks/web.yml
//!     extra_vars_json: '{"http_port": 8080}'
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod inventory;
pub mod planner;
pub mod provider;
pub mod resource;
pub mod runner;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigHasher, Manifest, ManifestParser, ManifestValidator, RunConfig};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use error::{AnsiblePlayError, Result};
pub use inventory::{HostSpec, Inventory, InventoryMode};
pub use planner::{ApplyPlan, DiffEngine, PlanExecutor};
pub use provider::{ProviderResolver, ResolvedConfig};
pub use resource::{Operation, OperationResponse, RunResource, RunState};
pub use runner::{CancelSource, CancelToken, PlaybookRunner, ProcessRunner};
pub use state::{LocalStateStore, ProviderState, StateStore};
