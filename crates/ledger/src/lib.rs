//! Ledger (banking service) contract consumed by the transfer saga.
//!
//! The saga only depends on two operations, `withdraw` and `deposit`, and on
//! the closed error taxonomy in [`error`]. [`InMemoryLedger`] is the mock
//! account store used by tests and by the demo worker.

pub mod client;
pub mod error;
pub mod memory;

pub use client::{ConfirmationToken, LedgerClient, Operation};
pub use error::{ErrorKind, LedgerError};
pub use memory::{InMemoryLedger, LedgerCall};
