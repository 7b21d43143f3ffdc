//! Shared identifier types for the target provisioning system.

pub mod types;

pub use types::{ResourceId, RunId};
