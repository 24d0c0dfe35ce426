//! Transfer saga instance rebuilt from history.

use common::WorkflowId;
use domain::{Aggregate, TransferRequest};
use history::Sequence;
use ledger::ConfirmationToken;
use serde::{Deserialize, Serialize};

use crate::error::StepError;
use crate::events::TransferSagaEvent;
use crate::outcome::SagaOutcome;
use crate::state::SagaPhase;
use crate::steps::StepKind;

/// What the history says about one step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Attempts dispatched so far.
    pub attempts: u32,
    pub token: Option<ConfirmationToken>,
    /// Final error, set once the step failed for good.
    pub error: Option<StepError>,
    /// Error of the most recent failed attempt.
    pub last_error: Option<StepError>,
}

impl StepRecord {
    /// The durable result of the step, if it has one.
    pub fn result(&self) -> Option<Result<ConfirmationToken, StepError>> {
        match (&self.token, &self.error) {
            (Some(token), _) => Some(Ok(token.clone())),
            (None, Some(error)) => Some(Err(error.clone())),
            (None, None) => None,
        }
    }
}

/// An event-sourced transfer saga.
///
/// Tracks the phase, per-step attempts and results, and the terminal outcome.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferSagaInstance {
    id: Option<WorkflowId>,
    sequence: Sequence,
    request: Option<TransferRequest>,
    task_queue: Option<String>,
    phase: SagaPhase,
    withdraw: StepRecord,
    deposit: StepRecord,
    refund: StepRecord,
    outcome: Option<SagaOutcome>,
}

impl Aggregate for TransferSagaInstance {
    type Event = TransferSagaEvent;

    fn aggregate_type() -> &'static str {
        "MoneyTransfer"
    }

    fn id(&self) -> Option<&WorkflowId> {
        self.id.as_ref()
    }

    fn sequence(&self) -> Sequence {
        self.sequence
    }

    fn set_sequence(&mut self, sequence: Sequence) {
        self.sequence = sequence;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            TransferSagaEvent::TransferStarted(data) => {
                self.id = Some(data.workflow_id);
                self.request = Some(data.request);
                self.task_queue = Some(data.task_queue);
                self.phase = SagaPhase::Withdrawing;
            }
            TransferSagaEvent::StepScheduled(data) => {
                self.record_mut(data.step).attempts = data.attempt;
            }
            TransferSagaEvent::StepAttemptFailed(data) => {
                self.record_mut(data.step).last_error = Some(data.error);
            }
            TransferSagaEvent::StepCompleted(data) => {
                let record = self.record_mut(data.step);
                record.attempts = data.attempts;
                record.token = Some(data.token);
                if data.step == StepKind::Withdraw {
                    self.phase = SagaPhase::Depositing;
                }
            }
            TransferSagaEvent::StepFailed(data) => {
                let record = self.record_mut(data.step);
                record.attempts = data.attempts;
                record.last_error = Some(data.error.clone());
                record.error = Some(data.error);
                if data.step == StepKind::Deposit {
                    self.phase = SagaPhase::Refunding;
                }
            }
            TransferSagaEvent::TransferCompleted(data)
            | TransferSagaEvent::TransferCompensated(data)
            | TransferSagaEvent::TransferUncompensated(data)
            | TransferSagaEvent::WithdrawalFailed(data) => {
                self.phase = data.outcome.phase();
                self.outcome = Some(data.outcome);
            }
        }
    }
}

// Query methods
impl TransferSagaInstance {
    fn record_mut(&mut self, step: StepKind) -> &mut StepRecord {
        match step {
            StepKind::Withdraw => &mut self.withdraw,
            StepKind::Deposit => &mut self.deposit,
            StepKind::Refund => &mut self.refund,
        }
    }

    /// Returns the history of one step.
    pub fn step(&self, step: StepKind) -> &StepRecord {
        match step {
            StepKind::Withdraw => &self.withdraw,
            StepKind::Deposit => &self.deposit,
            StepKind::Refund => &self.refund,
        }
    }

    pub fn phase(&self) -> SagaPhase {
        self.phase
    }

    /// Returns the request the workflow was started with.
    pub fn request(&self) -> Option<&TransferRequest> {
        self.request.as_ref()
    }

    pub fn task_queue(&self) -> Option<&str> {
        self.task_queue.as_deref()
    }

    /// Returns the terminal outcome, if the workflow has finished.
    pub fn outcome(&self) -> Option<&SagaOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }
}
