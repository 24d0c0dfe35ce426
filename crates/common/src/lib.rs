//! Shared identifier types used across the transfer saga crates.

pub mod types;

pub use types::{AccountId, ReferenceId, WorkflowId};
