//! The two-operation ledger contract.

use async_trait::async_trait;
use common::{AccountId, ReferenceId};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Opaque confirmation returned by the ledger for an applied call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfirmationToken(String);

impl ConfirmationToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConfirmationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ledger primitive a call performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Withdraw,
    Deposit,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Withdraw => "withdraw",
            Operation::Deposit => "deposit",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client for the account ledger.
///
/// Both calls may be retried with the same `reference_id`; a conforming
/// ledger returns the original confirmation instead of applying the call
/// twice. Implementations must be safe for concurrent use.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Takes `amount` out of `account`.
    async fn withdraw(
        &self,
        account: &AccountId,
        amount: i64,
        reference_id: &ReferenceId,
    ) -> Result<ConfirmationToken, LedgerError>;

    /// Adds `amount` to `account`.
    async fn deposit(
        &self,
        account: &AccountId,
        amount: i64,
        reference_id: &ReferenceId,
    ) -> Result<ConfirmationToken, LedgerError>;
}
