//! State management module.
//!
//! This module provides persistent storage of what was last applied for every
//! run, the operation history and the state lock.

mod store;
mod local;
mod lock;
mod types;

pub use store::StateStore;
pub use local::{LocalStateStore, STATE_DIR};
pub use lock::{LOCK_EXPIRY_SECS, LockInfo, generate_holder_id};
pub use types::{HistoryEntry, HistoryOperation, MAX_HISTORY, ProviderState, RunRecord, STATE_VERSION};
