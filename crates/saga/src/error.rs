//! Saga error types.

use common::WorkflowId;
use domain::{DomainError, ValidationError};
use history::HistoryError;
use ledger::{ErrorKind, LedgerError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::SagaPhase;
use crate::steps::StepKind;

/// Failure of a single step, as recorded in the workflow history.
///
/// Ledger errors are carried unchanged; the engine adds its own two kinds.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail")]
pub enum StepError {
    /// The ledger rejected the call.
    #[error(transparent)]
    Ledger(LedgerError),

    /// An attempt exceeded its start-to-close timeout.
    #[error("{step} step timed out after {after_ms}ms")]
    Timeout { step: StepKind, after_ms: u64 },

    /// The workflow was cancelled while the step was waiting to retry.
    #[error("{step} step was cancelled")]
    Cancelled { step: StepKind },
}

impl StepError {
    /// Returns the ledger error kind, if the failure came from the ledger.
    pub fn ledger_kind(&self) -> Option<ErrorKind> {
        match self {
            StepError::Ledger(err) => Some(err.kind()),
            _ => None,
        }
    }

    /// Short label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            StepError::Ledger(err) => err.kind().as_str(),
            StepError::Timeout { .. } => "Timeout",
            StepError::Cancelled { .. } => "Cancelled",
        }
    }
}

impl From<LedgerError> for StepError {
    fn from(err: LedgerError) -> Self {
        StepError::Ledger(err)
    }
}

/// Errors that stop the orchestration itself.
///
/// Business failures of a transfer are never reported here; they end up in a
/// [`SagaOutcome`](crate::outcome::SagaOutcome).
#[derive(Debug, Error)]
pub enum SagaError {
    /// The request was rejected before any step ran.
    #[error("Invalid transfer request: {0}")]
    Validation(#[from] ValidationError),

    /// No history exists for the workflow.
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(WorkflowId),

    /// The workflow is already being driven in this process.
    #[error("Workflow {0} is already running")]
    AlreadyRunning(WorkflowId),

    /// The reference id was reused for a different transfer.
    #[error("Workflow {workflow_id} was started with a different request")]
    ReferenceConflict { workflow_id: WorkflowId },

    /// Cancellation is only accepted while the withdrawal is in progress.
    #[error("Cannot cancel workflow {workflow_id} in phase {phase}")]
    CancellationRejected {
        workflow_id: WorkflowId,
        phase: SagaPhase,
    },

    /// The history does not contain the start event.
    #[error("Corrupt history for workflow {workflow_id}: {reason}")]
    CorruptHistory {
        workflow_id: WorkflowId,
        reason: String,
    },

    /// The worker behind a task queue has stopped.
    #[error("No worker is polling task queue {task_queue}")]
    WorkerUnavailable { task_queue: String },

    /// History store error.
    #[error("History error: {0}")]
    History(#[from] HistoryError),

    /// Domain error while rebuilding state.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
