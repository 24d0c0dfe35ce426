use serde::{Deserialize, Serialize};

/// Opaque identifier of a ledger account (e.g. `"85-150"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Creates an account ID from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the account ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the identifier is empty or whitespace only.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for AccountId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Caller-supplied reference identifying one logical transfer.
///
/// Ledger calls never use the raw reference; each step derives its own token
/// by suffixing it (see [`ReferenceId::derive`]) so every call stays traceable
/// back to the parent transfer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceId(String);

impl ReferenceId {
    /// Creates a reference ID from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the reference as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the reference is empty or whitespace only.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Derives a per-step reference, e.g. `tx-1` + `withdrawal` -> `tx-1-withdrawal`.
    pub fn derive(&self, suffix: &str) -> ReferenceId {
        ReferenceId(format!("{}-{}", self.0, suffix))
    }
}

impl std::fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ReferenceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ReferenceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Durable identity of one workflow run.
///
/// The engine guarantees at most one logical execution per workflow ID, so
/// transfers map their reference onto a stable workflow ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(String);

impl WorkflowId {
    /// Prefix used for transfer workflows.
    pub const TRANSFER_PREFIX: &'static str = "transfer-";

    /// Creates a workflow ID from a raw string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the workflow ID owning the given transfer reference.
    pub fn for_transfer(reference: &ReferenceId) -> Self {
        Self(format!("{}{}", Self::TRANSFER_PREFIX, reference.as_str()))
    }

    /// Returns the workflow ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkflowId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
