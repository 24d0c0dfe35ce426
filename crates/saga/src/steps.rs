//! Step functions: thin adapters from a transfer request to one ledger call.

use std::sync::Arc;

use async_trait::async_trait;
use common::ReferenceId;
use domain::TransferRequest;
use ledger::{ConfirmationToken, LedgerClient, LedgerError};
use serde::{Deserialize, Serialize};

/// The three steps of a transfer saga.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Withdraw,
    Deposit,
    Refund,
}

impl StepKind {
    /// Suffix appended to the transfer reference to form the step's ledger reference.
    pub fn reference_suffix(&self) -> &'static str {
        match self {
            StepKind::Withdraw => "withdrawal",
            StepKind::Deposit => "deposit",
            StepKind::Refund => "refund",
        }
    }

    /// Only the withdrawal can be interrupted by a cancellation request.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, StepKind::Withdraw)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Withdraw => "withdraw",
            StepKind::Deposit => "deposit",
            StepKind::Refund => "refund",
        }
    }

    /// Derives the reference passed to the ledger for this step.
    pub fn reference_for(&self, request: &TransferRequest) -> ReferenceId {
        request.reference_id.derive(self.reference_suffix())
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work the engine can schedule, retry and record.
///
/// Implementations must be safe to invoke repeatedly with the same request:
/// every attempt passes the same derived reference to the ledger.
#[async_trait]
pub trait StepFunction: Send + Sync {
    fn kind(&self) -> StepKind;

    async fn execute(&self, request: &TransferRequest) -> Result<ConfirmationToken, LedgerError>;
}

/// Takes the amount out of the source account.
pub struct WithdrawStep<L: LedgerClient> {
    ledger: Arc<L>,
}

impl<L: LedgerClient> WithdrawStep<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl<L: LedgerClient> StepFunction for WithdrawStep<L> {
    fn kind(&self) -> StepKind {
        StepKind::Withdraw
    }

    async fn execute(&self, request: &TransferRequest) -> Result<ConfirmationToken, LedgerError> {
        let reference = self.kind().reference_for(request);
        tracing::info!(
            account = %request.source_account,
            amount = request.amount,
            reference_id = %reference,
            "withdrawing funds"
        );

        let result = self
            .ledger
            .withdraw(&request.source_account, request.amount, &reference)
            .await;
        match &result {
            Ok(token) => tracing::info!(%token, reference_id = %reference, "withdrawal confirmed"),
            Err(err) => tracing::warn!(
                account = %request.source_account,
                amount = request.amount,
                reference_id = %reference,
                error = %err,
                "withdrawal failed"
            ),
        }
        result
    }
}

/// Adds the amount to the target account.
pub struct DepositStep<L: LedgerClient> {
    ledger: Arc<L>,
}

impl<L: LedgerClient> DepositStep<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl<L: LedgerClient> StepFunction for DepositStep<L> {
    fn kind(&self) -> StepKind {
        StepKind::Deposit
    }

    async fn execute(&self, request: &TransferRequest) -> Result<ConfirmationToken, LedgerError> {
        let reference = self.kind().reference_for(request);
        tracing::info!(
            account = %request.target_account,
            amount = request.amount,
            reference_id = %reference,
            "depositing funds"
        );

        let result = self
            .ledger
            .deposit(&request.target_account, request.amount, &reference)
            .await;
        match &result {
            Ok(token) => tracing::info!(%token, reference_id = %reference, "deposit confirmed"),
            Err(err) => tracing::warn!(
                account = %request.target_account,
                amount = request.amount,
                reference_id = %reference,
                error = %err,
                "deposit failed"
            ),
        }
        result
    }
}

/// Compensation: deposits the amount back into the source account.
pub struct RefundStep<L: LedgerClient> {
    ledger: Arc<L>,
}

impl<L: LedgerClient> RefundStep<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl<L: LedgerClient> StepFunction for RefundStep<L> {
    fn kind(&self) -> StepKind {
        StepKind::Refund
    }

    async fn execute(&self, request: &TransferRequest) -> Result<ConfirmationToken, LedgerError> {
        let reference = self.kind().reference_for(request);
        tracing::warn!(
            account = %request.source_account,
            amount = request.amount,
            reference_id = %reference,
            "refunding source account"
        );

        let result = self
            .ledger
            .deposit(&request.source_account, request.amount, &reference)
            .await;
        match &result {
            Ok(token) => tracing::info!(%token, reference_id = %reference, "refund confirmed"),
            Err(err) => tracing::error!(
                account = %request.source_account,
                amount = request.amount,
                reference_id = %reference,
                error = %err,
                "refund failed"
            ),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::AccountId;
    use ledger::{ErrorKind, InMemoryLedger, Operation};

    fn request() -> TransferRequest {
        TransferRequest::new("85-150", "43-812", 250, "tx-1")
    }

    fn ledger() -> Arc<InMemoryLedger> {
        Arc::new(InMemoryLedger::with_accounts([("85-150", 2000), ("43-812", 0)]))
    }

    #[test]
    fn derived_references() {
        let request = request();
        assert_eq!(StepKind::Withdraw.reference_for(&request).as_str(), "tx-1-withdrawal");
        assert_eq!(StepKind::Deposit.reference_for(&request).as_str(), "tx-1-deposit");
        assert_eq!(StepKind::Refund.reference_for(&request).as_str(), "tx-1-refund");
    }

    #[tokio::test]
    async fn withdraw_debits_source() {
        let ledger = ledger();
        let step = WithdrawStep::new(ledger.clone());

        let token = step.execute(&request()).await.unwrap();
        assert!(!token.as_str().is_empty());
        assert_eq!(ledger.balance(&AccountId::new("85-150")).await, Some(1750));

        let calls = ledger.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].operation, Operation::Withdraw);
        assert_eq!(calls[0].reference_id.as_str(), "tx-1-withdrawal");
    }

    #[tokio::test]
    async fn deposit_credits_target() {
        let ledger = ledger();
        let step = DepositStep::new(ledger.clone());

        step.execute(&request()).await.unwrap();
        assert_eq!(ledger.balance(&AccountId::new("43-812")).await, Some(250));
    }

    #[tokio::test]
    async fn refund_deposits_back_to_source() {
        let ledger = ledger();
        let step = RefundStep::new(ledger.clone());

        step.execute(&request()).await.unwrap();
        assert_eq!(ledger.balance(&AccountId::new("85-150")).await, Some(2250));

        let calls = ledger.calls();
        assert_eq!(calls[0].operation, Operation::Deposit);
        assert_eq!(calls[0].account.as_str(), "85-150");
        assert_eq!(calls[0].reference_id.as_str(), "tx-1-refund");
    }

    #[tokio::test]
    async fn errors_propagate_unchanged() {
        let ledger = ledger();
        let step = WithdrawStep::new(ledger.clone());
        let request = TransferRequest::new("85-150", "43-812", 5000, "tx-2");

        let err = step.execute(&request).await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientFunds {
                account: AccountId::new("85-150"),
                available: 2000,
                requested: 5000,
            }
        );
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    }

    #[tokio::test]
    async fn every_step_returns_the_ledger_result() {
        let ledger = ledger();
        let request = TransferRequest::new("00-000", "99-999", 10, "tx-3");
        let steps: [Box<dyn StepFunction>; 3] = [
            Box::new(WithdrawStep::new(ledger.clone())),
            Box::new(DepositStep::new(ledger.clone())),
            Box::new(RefundStep::new(ledger.clone())),
        ];

        let mut errors = Vec::new();
        for step in &steps {
            errors.push(step.execute(&request).await.unwrap_err());
        }

        assert_eq!(
            errors,
            vec![
                LedgerError::invalid_account(&AccountId::new("00-000")),
                LedgerError::invalid_account(&AccountId::new("99-999")),
                LedgerError::invalid_account(&AccountId::new("00-000")),
            ]
        );
        assert_eq!(ledger.calls().len(), 3);
    }
}
