//! In-memory ledger with per-account locking and reference-id dedup.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use common::{AccountId, ReferenceId};
use tokio::sync::RwLock;

use crate::client::{ConfirmationToken, LedgerClient, Operation};
use crate::error::LedgerError;

/// One call observed by the ledger, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerCall {
    pub operation: Operation,
    pub account: AccountId,
    pub amount: i64,
    pub reference_id: ReferenceId,
}

#[derive(Debug)]
struct Account {
    balance: i64,
}

/// A call that was applied, keyed by its reference ID.
#[derive(Debug, Clone)]
struct Applied {
    operation: Operation,
    account: AccountId,
    amount: i64,
    token: ConfirmationToken,
}

#[derive(Debug, Default)]
struct Faults {
    /// Remaining injected transaction failures per operation, optionally
    /// restricted to one account.
    transient: Vec<(Operation, Option<AccountId>, u32)>,
    fail_all_deposits: bool,
    latency: Option<Duration>,
}

#[derive(Debug, Default)]
struct LedgerState {
    accounts: RwLock<HashMap<AccountId, Arc<tokio::sync::Mutex<Account>>>>,
    applied: Mutex<HashMap<ReferenceId, Applied>>,
    calls: Mutex<Vec<LedgerCall>>,
    faults: Mutex<Faults>,
    next_id: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory account store implementing [`LedgerClient`].
///
/// Balances are mutated under a per-account lock, so concurrent sagas
/// touching the same account never lose updates. A call repeated with a
/// reference ID that was already applied returns the original confirmation
/// and leaves balances untouched.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<LedgerState>,
}

impl InMemoryLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a ledger holding the given accounts.
    pub fn with_accounts<I, A>(accounts: I) -> Self
    where
        I: IntoIterator<Item = (A, i64)>,
        A: Into<AccountId>,
    {
        let map = accounts
            .into_iter()
            .map(|(id, balance)| {
                (
                    id.into(),
                    Arc::new(tokio::sync::Mutex::new(Account { balance })),
                )
            })
            .collect();
        Self {
            state: Arc::new(LedgerState {
                accounts: RwLock::new(map),
                ..Default::default()
            }),
        }
    }

    /// Removes an account; later calls against it fail with `InvalidAccount`.
    pub async fn close_account(&self, account: &AccountId) -> Option<i64> {
        let removed = self.state.accounts.write().await.remove(account)?;
        let balance = removed.lock().await.balance;
        Some(balance)
    }

    /// Returns the current balance of an account.
    pub async fn balance(&self, account: &AccountId) -> Option<i64> {
        let handle = self.state.accounts.read().await.get(account).cloned()?;
        let balance = handle.lock().await.balance;
        Some(balance)
    }

    /// Returns every call received so far, including failed ones.
    pub fn calls(&self) -> Vec<LedgerCall> {
        lock(&self.state.calls).clone()
    }

    /// Returns the calls that targeted `account`.
    pub fn calls_for(&self, account: &AccountId) -> Vec<LedgerCall> {
        lock(&self.state.calls)
            .iter()
            .filter(|c| &c.account == account)
            .cloned()
            .collect()
    }

    /// Fails the next `times` calls of `operation` with a transaction error.
    pub fn fail_next(&self, operation: Operation, times: u32) {
        lock(&self.state.faults)
            .transient
            .push((operation, None, times));
    }

    /// Like [`fail_next`](Self::fail_next), restricted to one account.
    pub fn fail_next_for(&self, operation: Operation, account: &AccountId, times: u32) {
        lock(&self.state.faults)
            .transient
            .push((operation, Some(account.clone()), times));
    }

    /// Makes every deposit fail with a transaction error.
    pub fn set_fail_on_deposit(&self, fail: bool) {
        lock(&self.state.faults).fail_all_deposits = fail;
    }

    /// Adds a fixed delay before every call is processed.
    pub fn set_latency(&self, latency: Option<Duration>) {
        lock(&self.state.faults).latency = latency;
    }

    fn record(&self, operation: Operation, account: &AccountId, amount: i64, reference_id: &ReferenceId) {
        lock(&self.state.calls).push(LedgerCall {
            operation,
            account: account.clone(),
            amount,
            reference_id: reference_id.clone(),
        });
    }

    /// Consumes one injected fault matching the call, if any.
    fn injected_fault(
        &self,
        operation: Operation,
        account: &AccountId,
        reference_id: &ReferenceId,
    ) -> Option<LedgerError> {
        let mut faults = lock(&self.state.faults);
        if operation == Operation::Deposit && faults.fail_all_deposits {
            return Some(LedgerError::transaction(
                operation,
                account,
                reference_id,
                "simulated deposit failure",
            ));
        }

        let slot = faults.transient.iter_mut().find(|(op, target, left)| {
            *op == operation && *left > 0 && target.as_ref().is_none_or(|t| t == account)
        })?;
        slot.2 -= 1;
        faults.transient.retain(|(_, _, left)| *left > 0);
        Some(LedgerError::transaction(
            operation,
            account,
            reference_id,
            "simulated transient failure",
        ))
    }

    fn previously_applied(
        &self,
        operation: Operation,
        account: &AccountId,
        amount: i64,
        reference_id: &ReferenceId,
    ) -> Option<Result<ConfirmationToken, LedgerError>> {
        let applied = lock(&self.state.applied);
        let entry = applied.get(reference_id)?;
        if entry.operation == operation && &entry.account == account && entry.amount == amount {
            tracing::debug!(%reference_id, token = %entry.token, "duplicate ledger call, returning original confirmation");
            Some(Ok(entry.token.clone()))
        } else {
            Some(Err(LedgerError::transaction(
                operation,
                account,
                reference_id,
                "reference id already used for a different call",
            )))
        }
    }

    fn issue_token(&self, operation: Operation) -> ConfirmationToken {
        let n = self.state.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let prefix = match operation {
            Operation::Withdraw => 'W',
            Operation::Deposit => 'D',
        };
        ConfirmationToken::new(format!("{prefix}{n:010}"))
    }

    async fn apply(
        &self,
        operation: Operation,
        account: &AccountId,
        amount: i64,
        reference_id: &ReferenceId,
    ) -> Result<ConfirmationToken, LedgerError> {
        self.record(operation, account, amount, reference_id);

        let latency = lock(&self.state.faults).latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(err) = self.injected_fault(operation, account, reference_id) {
            return Err(err);
        }
        if let Some(result) = self.previously_applied(operation, account, amount, reference_id) {
            return result;
        }
        if amount <= 0 {
            return Err(LedgerError::transaction(
                operation,
                account,
                reference_id,
                format!("amount must be positive, got {amount}"),
            ));
        }

        let handle = self
            .state
            .accounts
            .read()
            .await
            .get(account)
            .cloned()
            .ok_or_else(|| LedgerError::invalid_account(account))?;

        let mut entry = handle.lock().await;

        // A concurrent duplicate may have been applied while we waited.
        if let Some(result) = self.previously_applied(operation, account, amount, reference_id) {
            return result;
        }

        match operation {
            Operation::Withdraw => {
                if entry.balance < amount {
                    return Err(LedgerError::InsufficientFunds {
                        account: account.clone(),
                        available: entry.balance,
                        requested: amount,
                    });
                }
                entry.balance -= amount;
            }
            Operation::Deposit => {
                entry.balance = entry.balance.checked_add(amount).ok_or_else(|| {
                    LedgerError::transaction(operation, account, reference_id, "balance overflow")
                })?;
            }
        }

        let token = self.issue_token(operation);
        lock(&self.state.applied).insert(
            reference_id.clone(),
            Applied {
                operation,
                account: account.clone(),
                amount,
                token: token.clone(),
            },
        );
        tracing::debug!(%operation, %account, amount, %reference_id, %token, balance = entry.balance, "ledger call applied");

        Ok(token)
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn withdraw(
        &self,
        account: &AccountId,
        amount: i64,
        reference_id: &ReferenceId,
    ) -> Result<ConfirmationToken, LedgerError> {
        self.apply(Operation::Withdraw, account, amount, reference_id)
            .await
    }

    async fn deposit(
        &self,
        account: &AccountId,
        amount: i64,
        reference_id: &ReferenceId,
    ) -> Result<ConfirmationToken, LedgerError> {
        self.apply(Operation::Deposit, account, amount, reference_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> AccountId {
        AccountId::new("85-150")
    }

    fn target() -> AccountId {
        AccountId::new("43-812")
    }

    fn seeded() -> InMemoryLedger {
        InMemoryLedger::with_accounts([("85-150", 2000), ("43-812", 0)])
    }

    #[tokio::test]
    async fn withdraw_debits_and_deposit_credits() {
        let ledger = seeded();

        let w = ledger
            .withdraw(&source(), 250, &ReferenceId::new("tx-1-withdrawal"))
            .await
            .unwrap();
        let d = ledger
            .deposit(&target(), 250, &ReferenceId::new("tx-1-deposit"))
            .await
            .unwrap();

        assert!(w.as_str().starts_with('W'));
        assert!(d.as_str().starts_with('D'));
        assert_eq!(ledger.balance(&source()).await, Some(1750));
        assert_eq!(ledger.balance(&target()).await, Some(250));
    }

    #[tokio::test]
    async fn tokens_are_unique_and_fixed_width() {
        let ledger = seeded();
        let a = ledger
            .deposit(&target(), 1, &ReferenceId::new("a"))
            .await
            .unwrap();
        let b = ledger
            .deposit(&target(), 1, &ReferenceId::new("b"))
            .await
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(a.as_str(), "D0000000001");
        assert_eq!(b.as_str(), "D0000000002");
    }

    #[tokio::test]
    async fn unknown_account_is_invalid() {
        let ledger = seeded();
        let missing = AccountId::new("00-000");
        let err = ledger
            .deposit(&missing, 10, &ReferenceId::new("tx-deposit"))
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::invalid_account(&missing));
    }

    #[tokio::test]
    async fn insufficient_funds_reports_amounts() {
        let ledger = InMemoryLedger::with_accounts([("85-150", 100)]);
        let err = ledger
            .withdraw(&source(), 250, &ReferenceId::new("tx-withdrawal"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientFunds {
                account: source(),
                available: 100,
                requested: 250,
            }
        );
        assert_eq!(ledger.balance(&source()).await, Some(100));
    }

    #[tokio::test]
    async fn repeated_reference_returns_original_token_once_applied() {
        let ledger = seeded();
        let reference = ReferenceId::new("tx-7-withdrawal");

        let first = ledger.withdraw(&source(), 250, &reference).await.unwrap();
        let second = ledger.withdraw(&source(), 250, &reference).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(ledger.balance(&source()).await, Some(1750));
        assert_eq!(ledger.calls().len(), 2);
    }

    #[tokio::test]
    async fn reused_reference_for_other_call_is_rejected() {
        let ledger = seeded();
        let reference = ReferenceId::new("tx-8");
        ledger.withdraw(&source(), 250, &reference).await.unwrap();

        let err = ledger.deposit(&target(), 250, &reference).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Transaction);
    }

    #[tokio::test]
    async fn injected_faults_are_consumed() {
        let ledger = seeded();
        ledger.fail_next(Operation::Deposit, 2);

        let reference = ReferenceId::new("tx-9-deposit");
        assert!(ledger.deposit(&target(), 5, &reference).await.is_err());
        assert!(ledger.deposit(&target(), 5, &reference).await.is_err());
        assert!(ledger.deposit(&target(), 5, &reference).await.is_ok());
        assert_eq!(ledger.balance(&target()).await, Some(5));
    }

    #[tokio::test]
    async fn account_scoped_faults_leave_other_accounts_alone() {
        let ledger = seeded();
        ledger.fail_next_for(Operation::Deposit, &target(), 1);

        assert!(
            ledger
                .deposit(&source(), 5, &ReferenceId::new("r1"))
                .await
                .is_ok()
        );
        assert!(
            ledger
                .deposit(&target(), 5, &ReferenceId::new("r2"))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn closed_account_becomes_invalid() {
        let ledger = seeded();
        assert_eq!(ledger.close_account(&source()).await, Some(2000));
        let err = ledger
            .deposit(&source(), 250, &ReferenceId::new("tx-refund"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidAccount);
    }

    #[tokio::test]
    async fn deposit_overflow_is_a_transaction_error() {
        let ledger = InMemoryLedger::with_accounts([("43-812", 1)]);
        let reference = ReferenceId::new("tx-big-deposit");

        let err = ledger
            .deposit(&target(), i64::MAX, &reference)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            LedgerError::transaction(Operation::Deposit, &target(), &reference, "balance overflow")
        );
        assert_eq!(ledger.balance(&target()).await, Some(1));
        // Nothing was applied, so the reference is still free.
        assert!(ledger.deposit(&target(), 1, &reference).await.is_ok());
        assert_eq!(ledger.balance(&target()).await, Some(2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_withdrawals_do_not_lose_updates() {
        let ledger = InMemoryLedger::with_accounts([("85-150", 1_000)]);

        let mut handles = Vec::new();
        for i in 0..100 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .withdraw(&source(), 10, &ReferenceId::new(format!("tx-{i}-withdrawal")))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(ledger.balance(&source()).await, Some(0));
        let err = ledger
            .withdraw(&source(), 10, &ReferenceId::new("one-too-many"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InsufficientFunds);
    }
}
