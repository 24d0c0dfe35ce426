//! Durable funds-transfer saga.
//!
//! A transfer withdraws from a source account and deposits to a target
//! account. If the deposit fails, the source is refunded. Every step runs
//! through the [`DurableEngine`], which records attempts and results in the
//! workflow history, retries according to the [`RetryPolicy`] and lets a
//! workflow resume from its recorded position after a restart.
//!
//! The transfer saga follows these steps:
//! 1. Withdraw from the source account
//! 2. Deposit to the target account
//! 3. On deposit failure only: refund the source account

pub mod aggregate;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod outcome;
pub mod retry;
pub mod state;
pub mod steps;
pub mod worker;

pub use aggregate::{StepRecord, TransferSagaInstance};
pub use config::{DEFAULT_TASK_QUEUE, SagaConfig};
pub use engine::{DurableEngine, StepResult, WorkflowContext};
pub use error::{SagaError, StepError};
pub use events::TransferSagaEvent;
pub use orchestrator::TransferSaga;
pub use outcome::{SagaOutcome, Severity};
pub use retry::RetryPolicy;
pub use state::SagaPhase;
pub use steps::{DepositStep, RefundStep, StepFunction, StepKind, WithdrawStep};
pub use worker::{OutcomeReceiver, TransferClient, TransferWorker, task_queue};
