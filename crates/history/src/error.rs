use thiserror::Error;

use crate::{Sequence, WorkflowId};

/// Errors that can occur when interacting with the history store.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Another writer appended to the workflow first.
    /// The expected sequence did not match the stored one.
    #[error(
        "Sequence conflict for workflow {workflow_id}: expected sequence {expected}, found {actual}"
    )]
    SequenceConflict {
        workflow_id: WorkflowId,
        expected: Sequence,
        actual: Sequence,
    },

    /// The batch handed to `append` is malformed.
    #[error("Invalid append: {0}")]
    InvalidAppend(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for history store operations.
pub type Result<T> = std::result::Result<T, HistoryError>;
