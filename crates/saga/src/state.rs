//! Transfer saga state machine.

use serde::{Deserialize, Serialize};

use crate::steps::StepKind;

/// The phase of a transfer saga in its lifecycle.
///
/// Phase transitions:
/// ```text
/// Start ──► Withdrawing ──┬──► WithdrawalFailed
///                         └──► Depositing ──┬──► Completed
///                                           └──► Refunding ──┬──► CompensatedFailure
///                                                            └──► UncompensatedFailure
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaPhase {
    /// No history recorded yet.
    #[default]
    Start,

    /// The withdrawal is being attempted.
    Withdrawing,

    /// Funds left the source; the deposit is being attempted.
    Depositing,

    /// The deposit failed; the source is being refunded.
    Refunding,

    /// Both legs succeeded (terminal).
    Completed,

    /// The refund restored the source (terminal).
    CompensatedFailure,

    /// The refund failed; funds are stuck (terminal).
    UncompensatedFailure,

    /// The withdrawal never happened (terminal).
    WithdrawalFailed,
}

impl SagaPhase {
    /// Returns true if this is a terminal phase.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaPhase::Completed
                | SagaPhase::CompensatedFailure
                | SagaPhase::UncompensatedFailure
                | SagaPhase::WithdrawalFailed
        )
    }

    /// Returns true if a cancellation request may be accepted.
    pub fn can_cancel(&self) -> bool {
        matches!(self, SagaPhase::Withdrawing)
    }

    /// The step driven while in this phase, if any.
    pub fn active_step(&self) -> Option<StepKind> {
        match self {
            SagaPhase::Withdrawing => Some(StepKind::Withdraw),
            SagaPhase::Depositing => Some(StepKind::Deposit),
            SagaPhase::Refunding => Some(StepKind::Refund),
            _ => None,
        }
    }

    /// Returns the phase name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaPhase::Start => "Start",
            SagaPhase::Withdrawing => "Withdrawing",
            SagaPhase::Depositing => "Depositing",
            SagaPhase::Refunding => "Refunding",
            SagaPhase::Completed => "Completed",
            SagaPhase::CompensatedFailure => "CompensatedFailure",
            SagaPhase::UncompensatedFailure => "UncompensatedFailure",
            SagaPhase::WithdrawalFailed => "WithdrawalFailed",
        }
    }
}

impl std::fmt::Display for SagaPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
