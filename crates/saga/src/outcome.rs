//! Terminal result of a transfer saga.

use ledger::ConfirmationToken;
use serde::{Deserialize, Serialize};

use crate::error::StepError;
use crate::state::SagaPhase;

/// How loudly an outcome must be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    /// Needs manual intervention.
    Critical,
}

/// The terminal result of one saga run. Produced exactly once per workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum SagaOutcome {
    /// Both legs succeeded.
    Completed {
        withdrawal_token: ConfirmationToken,
        deposit_token: ConfirmationToken,
    },

    /// The deposit failed and the source was refunded.
    CompensatedFailure {
        deposit_error: StepError,
        refund_token: ConfirmationToken,
    },

    /// The deposit failed and so did the refund: the withdrawn funds are
    /// held by nobody.
    UncompensatedFailure {
        deposit_error: StepError,
        refund_error: StepError,
    },

    /// The withdrawal failed; no money moved.
    WithdrawalFailed { withdrawal_error: StepError },
}

impl SagaOutcome {
    pub fn as_str(&self) -> &'static str {
        self.phase().as_str()
    }

    /// The terminal phase this outcome corresponds to.
    pub fn phase(&self) -> SagaPhase {
        match self {
            SagaOutcome::Completed { .. } => SagaPhase::Completed,
            SagaOutcome::CompensatedFailure { .. } => SagaPhase::CompensatedFailure,
            SagaOutcome::UncompensatedFailure { .. } => SagaPhase::UncompensatedFailure,
            SagaOutcome::WithdrawalFailed { .. } => SagaPhase::WithdrawalFailed,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            SagaOutcome::Completed { .. } => Severity::Info,
            SagaOutcome::CompensatedFailure { .. } | SagaOutcome::WithdrawalFailed { .. } => {
                Severity::Warning
            }
            SagaOutcome::UncompensatedFailure { .. } => Severity::Critical,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SagaOutcome::Completed { .. })
    }
}

impl std::fmt::Display for SagaOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SagaOutcome::Completed {
                withdrawal_token,
                deposit_token,
            } => write!(
                f,
                "transfer complete (withdrawal {withdrawal_token}, deposit {deposit_token})"
            ),
            SagaOutcome::CompensatedFailure {
                deposit_error,
                refund_token,
            } => write!(
                f,
                "deposit failed: {deposit_error}; source refunded ({refund_token})"
            ),
            SagaOutcome::UncompensatedFailure {
                deposit_error,
                refund_error,
            } => write!(
                f,
                "deposit failed: {deposit_error}; refund failed: {refund_error}"
            ),
            SagaOutcome::WithdrawalFailed { withdrawal_error } => {
                write!(f, "withdrawal failed: {withdrawal_error}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::AccountId;
    use ledger::LedgerError;

    fn invalid(account: &str) -> StepError {
        LedgerError::invalid_account(&AccountId::new(account)).into()
    }

    #[test]
    fn severity_per_outcome() {
        let completed = SagaOutcome::Completed {
            withdrawal_token: ConfirmationToken::new("W1"),
            deposit_token: ConfirmationToken::new("D2"),
        };
        assert_eq!(completed.severity(), Severity::Info);
        assert!(completed.is_success());

        let uncompensated = SagaOutcome::UncompensatedFailure {
            deposit_error: invalid("43-812"),
            refund_error: invalid("85-150"),
        };
        assert_eq!(uncompensated.severity(), Severity::Critical);
        assert_eq!(uncompensated.as_str(), "UncompensatedFailure");
        assert!(uncompensated.phase().is_terminal());
    }

    #[test]
    fn serialized_form_is_tagged_by_status() {
        let outcome = SagaOutcome::CompensatedFailure {
            deposit_error: invalid("43-812"),
            refund_token: ConfirmationToken::new("D0000000003"),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "CompensatedFailure");
        assert_eq!(json["refund_token"], "D0000000003");
        assert_eq!(json["deposit_error"]["detail"]["account"], "43-812");

        let back: SagaOutcome = serde_json::from_value(json).unwrap();
        assert_eq!(back, outcome);
    }

    #[test]
    fn display_mentions_both_errors() {
        let outcome = SagaOutcome::UncompensatedFailure {
            deposit_error: invalid("43-812"),
            refund_error: invalid("85-150"),
        };
        let text = outcome.to_string();
        assert!(text.contains("43-812"));
        assert!(text.contains("85-150"));
    }
}
