//! Provider configuration.
//!
//! Resolves the provider block of the manifest into an immutable
//! [`ResolvedConfig`] that every run resource shares.

mod resolve;

pub use resolve::{DEFAULT_PLAYBOOK_BINARY, ProviderResolver, ResolvedConfig};
