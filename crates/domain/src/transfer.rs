//! The transfer request.

use common::{AccountId, ReferenceId, WorkflowId};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Immutable input to one transfer saga.
///
/// `amount` is in currency-agnostic minor units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub source_account: AccountId,
    pub target_account: AccountId,
    pub amount: i64,
    pub reference_id: ReferenceId,
}

impl TransferRequest {
    pub fn new(
        source_account: impl Into<AccountId>,
        target_account: impl Into<AccountId>,
        amount: i64,
        reference_id: impl Into<ReferenceId>,
    ) -> Self {
        Self {
            source_account: source_account.into(),
            target_account: target_account.into(),
            amount,
            reference_id: reference_id.into(),
        }
    }

    /// Checks the request invariants.
    ///
    /// Runs before any step is scheduled, so a rejected request never
    /// consumes retry budget or touches the ledger.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.amount <= 0 {
            return Err(ValidationError::NonPositiveAmount {
                amount: self.amount,
            });
        }
        if self.source_account.is_blank() {
            return Err(ValidationError::MissingAccount { role: "source" });
        }
        if self.target_account.is_blank() {
            return Err(ValidationError::MissingAccount { role: "target" });
        }
        if self.source_account == self.target_account {
            return Err(ValidationError::SameAccount {
                account: self.source_account.clone(),
            });
        }
        if self.reference_id.is_blank() {
            return Err(ValidationError::MissingReference);
        }
        Ok(())
    }

    /// The workflow that owns this transfer.
    pub fn workflow_id(&self) -> WorkflowId {
        WorkflowId::for_transfer(&self.reference_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> TransferRequest {
        TransferRequest::new("85-150", "43-812", 250, "tx-12345")
    }

    #[test]
    fn valid_request_passes() {
        assert_eq!(valid().validate(), Ok(()));
    }

    #[test]
    fn zero_and_negative_amounts_rejected() {
        for amount in [0, -1, i64::MIN] {
            let request = TransferRequest { amount, ..valid() };
            assert_eq!(
                request.validate(),
                Err(ValidationError::NonPositiveAmount { amount })
            );
        }
    }

    #[test]
    fn empty_accounts_rejected() {
        let request = TransferRequest {
            source_account: AccountId::new(""),
            ..valid()
        };
        assert_eq!(
            request.validate(),
            Err(ValidationError::MissingAccount { role: "source" })
        );

        let request = TransferRequest {
            target_account: AccountId::new(" "),
            ..valid()
        };
        assert_eq!(
            request.validate(),
            Err(ValidationError::MissingAccount { role: "target" })
        );
    }

    #[test]
    fn identical_accounts_rejected() {
        let request = TransferRequest::new("85-150", "85-150", 10, "tx-1");
        assert!(matches!(
            request.validate(),
            Err(ValidationError::SameAccount { .. })
        ));
    }

    #[test]
    fn empty_reference_rejected() {
        let request = TransferRequest::new("85-150", "43-812", 10, "");
        assert_eq!(request.validate(), Err(ValidationError::MissingReference));
    }

    #[test]
    fn workflow_id_derives_from_reference() {
        assert_eq!(valid().workflow_id().as_str(), "transfer-tx-12345");
    }

    #[test]
    fn deserializes_from_json() {
        let request: TransferRequest = serde_json::from_value(serde_json::json!({
            "source_account": "85-150",
            "target_account": "43-812",
            "amount": 250,
            "reference_id": "tx-12345"
        }))
        .unwrap();
        assert_eq!(request, valid());
    }
}
