//! Ledger error taxonomy.

use common::{AccountId, ReferenceId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::client::Operation;

/// Discriminant of a [`LedgerError`], used for retry classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidAccount,
    InsufficientFunds,
    Transaction,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidAccount => "InvalidAccount",
            ErrorKind::InsufficientFunds => "InsufficientFunds",
            ErrorKind::Transaction => "Transaction",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by a ledger call.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum LedgerError {
    /// The account does not exist in the ledger.
    #[error("account number {account} is invalid")]
    InvalidAccount { account: AccountId },

    /// The account balance is below the requested amount.
    #[error("insufficient funds in account {account}: available {available}, requested {requested}")]
    InsufficientFunds {
        account: AccountId,
        available: i64,
        requested: i64,
    },

    /// Generic backend failure; may succeed on a later attempt.
    #[error("{operation} failed for account {account} (ref: {reference_id}): {message}")]
    Transaction {
        operation: Operation,
        account: AccountId,
        reference_id: ReferenceId,
        message: String,
    },
}

impl LedgerError {
    /// Returns the error's kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidAccount { .. } => ErrorKind::InvalidAccount,
            LedgerError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            LedgerError::Transaction { .. } => ErrorKind::Transaction,
        }
    }

    pub fn invalid_account(account: &AccountId) -> Self {
        LedgerError::InvalidAccount {
            account: account.clone(),
        }
    }

    pub fn transaction(
        operation: Operation,
        account: &AccountId,
        reference_id: &ReferenceId,
        message: impl Into<String>,
    ) -> Self {
        LedgerError::Transaction {
            operation,
            account: account.clone(),
            reference_id: reference_id.clone(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        let account = AccountId::new("85-150");
        assert_eq!(
            LedgerError::invalid_account(&account).kind(),
            ErrorKind::InvalidAccount
        );
        assert_eq!(
            LedgerError::InsufficientFunds {
                account: account.clone(),
                available: 100,
                requested: 250,
            }
            .kind(),
            ErrorKind::InsufficientFunds
        );
        assert_eq!(
            LedgerError::transaction(
                Operation::Deposit,
                &account,
                &ReferenceId::new("tx-1-deposit"),
                "backend unavailable"
            )
            .kind(),
            ErrorKind::Transaction
        );
    }

    #[test]
    fn messages_carry_diagnostics() {
        let err = LedgerError::InsufficientFunds {
            account: AccountId::new("85-150"),
            available: 100,
            requested: 250,
        };
        assert_eq!(
            err.to_string(),
            "insufficient funds in account 85-150: available 100, requested 250"
        );

        let err = LedgerError::transaction(
            Operation::Deposit,
            &AccountId::new("43-812"),
            &ReferenceId::new("tx-1-deposit"),
            "simulated deposit failure",
        );
        assert_eq!(
            err.to_string(),
            "deposit failed for account 43-812 (ref: tx-1-deposit): simulated deposit failure"
        );
    }

    #[test]
    fn serialized_form_is_tagged_by_kind() {
        let err = LedgerError::invalid_account(&AccountId::new("00-000"));
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "InvalidAccount");
        assert_eq!(json["account"], "00-000");

        let back: LedgerError = serde_json::from_value(json).unwrap();
        assert_eq!(back, err);
    }
}
