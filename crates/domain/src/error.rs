//! Domain error types.

use common::AccountId;
use thiserror::Error;

/// A transfer request that must be rejected before any ledger call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("amount must be positive, got {amount}")]
    NonPositiveAmount { amount: i64 },

    #[error("{role} account must not be empty")]
    MissingAccount { role: &'static str },

    #[error("source and target account are both {account}")]
    SameAccount { account: AccountId },

    #[error("reference id must not be empty")]
    MissingReference,
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The request failed validation.
    #[error("Invalid transfer request: {0}")]
    Validation(#[from] ValidationError),

    /// A history payload could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
