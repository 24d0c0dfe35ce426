//! Events recorded in a transfer workflow's history.

use chrono::{DateTime, Utc};
use common::WorkflowId;
use domain::{DomainEvent, TransferRequest};
use ledger::ConfirmationToken;
use serde::{Deserialize, Serialize};

use crate::error::StepError;
use crate::outcome::SagaOutcome;
use crate::steps::StepKind;

/// Events that can occur during a transfer saga.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TransferSagaEvent {
    /// The workflow was accepted with its immutable request.
    TransferStarted(TransferStartedData),

    /// An attempt of a step was dispatched.
    StepScheduled(StepScheduledData),

    /// An attempt failed and the step will be retried.
    StepAttemptFailed(StepAttemptFailedData),

    /// A step returned a confirmation.
    StepCompleted(StepCompletedData),

    /// A step failed for good.
    StepFailed(StepFailedData),

    /// Both legs succeeded.
    TransferCompleted(TransferEndedData),

    /// The deposit failed and the refund succeeded.
    TransferCompensated(TransferEndedData),

    /// The deposit and the refund both failed.
    TransferUncompensated(TransferEndedData),

    /// The withdrawal failed.
    WithdrawalFailed(TransferEndedData),
}

impl DomainEvent for TransferSagaEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TransferSagaEvent::TransferStarted(_) => "TransferStarted",
            TransferSagaEvent::StepScheduled(_) => "StepScheduled",
            TransferSagaEvent::StepAttemptFailed(_) => "StepAttemptFailed",
            TransferSagaEvent::StepCompleted(_) => "StepCompleted",
            TransferSagaEvent::StepFailed(_) => "StepFailed",
            TransferSagaEvent::TransferCompleted(_) => "TransferCompleted",
            TransferSagaEvent::TransferCompensated(_) => "TransferCompensated",
            TransferSagaEvent::TransferUncompensated(_) => "TransferUncompensated",
            TransferSagaEvent::WithdrawalFailed(_) => "WithdrawalFailed",
        }
    }
}

/// Event types that close a workflow.
pub const TERMINAL_EVENT_TYPES: [&str; 4] = [
    "TransferCompleted",
    "TransferCompensated",
    "TransferUncompensated",
    "WithdrawalFailed",
];

/// Data for TransferStarted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferStartedData {
    pub workflow_id: WorkflowId,
    pub request: TransferRequest,
    /// Task queue the workflow was submitted to.
    pub task_queue: String,
    pub started_at: DateTime<Utc>,
}

/// Data for StepScheduled event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepScheduledData {
    pub step: StepKind,
    /// 1-based attempt number.
    pub attempt: u32,
}

/// Data for StepAttemptFailed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepAttemptFailedData {
    pub step: StepKind,
    pub attempt: u32,
    pub error: StepError,
    /// Backoff before the next attempt.
    pub next_delay_ms: u64,
}

/// Data for StepCompleted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepCompletedData {
    pub step: StepKind,
    pub token: ConfirmationToken,
    pub attempts: u32,
}

/// Data for StepFailed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepFailedData {
    pub step: StepKind,
    pub error: StepError,
    pub attempts: u32,
}

/// Data shared by the terminal events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferEndedData {
    pub outcome: SagaOutcome,
    pub ended_at: DateTime<Utc>,
}

// Convenience constructors
impl TransferSagaEvent {
    pub fn transfer_started(
        workflow_id: WorkflowId,
        request: TransferRequest,
        task_queue: impl Into<String>,
    ) -> Self {
        TransferSagaEvent::TransferStarted(TransferStartedData {
            workflow_id,
            request,
            task_queue: task_queue.into(),
            started_at: Utc::now(),
        })
    }

    pub fn step_scheduled(step: StepKind, attempt: u32) -> Self {
        TransferSagaEvent::StepScheduled(StepScheduledData { step, attempt })
    }

    pub fn step_attempt_failed(
        step: StepKind,
        attempt: u32,
        error: StepError,
        next_delay: std::time::Duration,
    ) -> Self {
        TransferSagaEvent::StepAttemptFailed(StepAttemptFailedData {
            step,
            attempt,
            error,
            next_delay_ms: u64::try_from(next_delay.as_millis()).unwrap_or(u64::MAX),
        })
    }

    pub fn step_completed(step: StepKind, token: ConfirmationToken, attempts: u32) -> Self {
        TransferSagaEvent::StepCompleted(StepCompletedData {
            step,
            token,
            attempts,
        })
    }

    pub fn step_failed(step: StepKind, error: StepError, attempts: u32) -> Self {
        TransferSagaEvent::StepFailed(StepFailedData {
            step,
            error,
            attempts,
        })
    }

    /// Creates the terminal event matching the outcome.
    pub fn transfer_ended(outcome: SagaOutcome) -> Self {
        let data = TransferEndedData {
            ended_at: Utc::now(),
            outcome,
        };
        match data.outcome {
            SagaOutcome::Completed { .. } => TransferSagaEvent::TransferCompleted(data),
            SagaOutcome::CompensatedFailure { .. } => TransferSagaEvent::TransferCompensated(data),
            SagaOutcome::UncompensatedFailure { .. } => {
                TransferSagaEvent::TransferUncompensated(data)
            }
            SagaOutcome::WithdrawalFailed { .. } => TransferSagaEvent::WithdrawalFailed(data),
        }
    }

    /// Returns true if this event closes the workflow.
    pub fn is_terminal(&self) -> bool {
        TERMINAL_EVENT_TYPES.contains(&self.event_type())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::AccountId;
    use ledger::LedgerError;
    use std::time::Duration;

    fn request() -> TransferRequest {
        TransferRequest::new("85-150", "43-812", 250, "tx-1")
    }

    #[test]
    fn test_event_type() {
        let workflow_id = request().workflow_id();
        assert_eq!(
            TransferSagaEvent::transfer_started(workflow_id, request(), "q").event_type(),
            "TransferStarted"
        );
        assert_eq!(
            TransferSagaEvent::step_scheduled(StepKind::Withdraw, 1).event_type(),
            "StepScheduled"
        );
        assert_eq!(
            TransferSagaEvent::step_completed(StepKind::Deposit, ConfirmationToken::new("D1"), 1)
                .event_type(),
            "StepCompleted"
        );
    }

    #[test]
    fn terminal_event_matches_outcome() {
        let error: StepError = LedgerError::invalid_account(&AccountId::new("43-812")).into();

        let event = TransferSagaEvent::transfer_ended(SagaOutcome::WithdrawalFailed {
            withdrawal_error: error.clone(),
        });
        assert_eq!(event.event_type(), "WithdrawalFailed");
        assert!(event.is_terminal());

        let event = TransferSagaEvent::transfer_ended(SagaOutcome::UncompensatedFailure {
            deposit_error: error.clone(),
            refund_error: error,
        });
        assert_eq!(event.event_type(), "TransferUncompensated");

        assert!(!TransferSagaEvent::step_scheduled(StepKind::Refund, 1).is_terminal());
    }

    #[test]
    fn attempt_failed_records_delay_in_millis() {
        let error = StepError::Timeout {
            step: StepKind::Deposit,
            after_ms: 100,
        };
        let event =
            TransferSagaEvent::step_attempt_failed(StepKind::Deposit, 2, error, Duration::from_secs(4));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "StepAttemptFailed");
        assert_eq!(json["data"]["next_delay_ms"], 4000);
        assert_eq!(json["data"]["step"], "deposit");
    }

    #[test]
    fn started_event_carries_request() {
        let event =
            TransferSagaEvent::transfer_started(request().workflow_id(), request(), "TRANSFER_MONEY_TASK_QUEUE");
        let json = serde_json::to_string(&event).unwrap();
        let back: TransferSagaEvent = serde_json::from_str(&json).unwrap();

        let TransferSagaEvent::TransferStarted(data) = back else {
            panic!("expected TransferStarted");
        };
        assert_eq!(data.request, request());
        assert_eq!(data.workflow_id.as_str(), "transfer-tx-1");
        assert_eq!(data.task_queue, "TRANSFER_MONEY_TASK_QUEUE");
    }
}
