//! Playbook execution.
//!
//! This module runs `ansible-playbook` as an opaque subprocess:
//! - Building the command line from a run's configuration
//! - Running it under a cancellable context with an optional time limit
//! - Capturing standard output and standard error in full

mod cancel;
mod command;
mod process;

pub use cancel::{CancelSource, CancelToken};
pub use command::PlaybookInvocation;
pub use process::{ExecutionOutput, PlaybookRunner, ProcessRunner};

#[cfg(test)]
pub use process::MockPlaybookRunner;
