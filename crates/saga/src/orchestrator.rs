//! Transfer saga orchestrator.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Instant;

use common::{ReferenceId, WorkflowId};
use domain::TransferRequest;
use futures_util::StreamExt;
use history::HistoryStore;
use ledger::LedgerClient;
use tokio::task::JoinSet;

use crate::aggregate::TransferSagaInstance;
use crate::config::SagaConfig;
use crate::engine::{DurableEngine, WorkflowContext};
use crate::error::{Result, SagaError};
use crate::events::TERMINAL_EVENT_TYPES;
use crate::outcome::{SagaOutcome, Severity};
use crate::steps::{DepositStep, RefundStep, WithdrawStep};

/// Drives transfers through withdraw, deposit and, when the deposit fails,
/// a compensating refund.
///
/// Steps never repeat once they have a recorded result, and the saga never
/// retries across steps: a terminal [`SagaOutcome`] is reached after at most
/// three steps.
pub struct TransferSaga<S: HistoryStore, L: LedgerClient> {
    engine: DurableEngine<S>,
    withdraw: WithdrawStep<L>,
    deposit: DepositStep<L>,
    refund: RefundStep<L>,
    config: SagaConfig,
}

impl<S: HistoryStore, L: LedgerClient> TransferSaga<S, L> {
    pub fn new(store: S, ledger: Arc<L>, config: SagaConfig) -> Self {
        Self {
            engine: DurableEngine::new(store),
            withdraw: WithdrawStep::new(Arc::clone(&ledger)),
            deposit: DepositStep::new(Arc::clone(&ledger)),
            refund: RefundStep::new(ledger),
            config,
        }
    }

    pub fn config(&self) -> &SagaConfig {
        &self.config
    }

    pub fn engine(&self) -> &DurableEngine<S> {
        &self.engine
    }

    /// Runs a transfer to its terminal outcome.
    ///
    /// Invalid requests are rejected before anything is recorded. Running a
    /// request whose workflow already finished returns the recorded outcome
    /// without touching the ledger.
    #[tracing::instrument(
        skip(self, request),
        fields(
            workflow_id = %request.workflow_id(),
            reference_id = %request.reference_id,
            amount = request.amount
        )
    )]
    pub async fn run(&self, request: TransferRequest) -> Result<SagaOutcome> {
        if let Err(err) = request.validate() {
            tracing::warn!(error = %err, "rejected transfer request");
            return Err(err.into());
        }

        let ctx = self
            .engine
            .start(&request, &self.config.task_queue)
            .await?;
        self.drive(ctx).await
    }

    /// Continues a workflow from its recorded position.
    #[tracing::instrument(skip(self), fields(workflow_id = %workflow_id))]
    pub async fn resume(&self, workflow_id: &WorkflowId) -> Result<SagaOutcome> {
        let ctx = self.engine.resume(workflow_id).await?;
        self.drive(ctx).await
    }

    async fn drive(&self, mut ctx: WorkflowContext) -> Result<SagaOutcome> {
        if let Some(outcome) = ctx.instance().outcome() {
            tracing::info!(outcome = outcome.as_str(), "workflow already finished");
            return Ok(outcome.clone());
        }

        let started = Instant::now();
        let request = ctx.request()?;
        let policy = &self.config.retry_policy;
        let timeout = self.config.step_timeout;

        let withdrawal = self
            .engine
            .run_step(&mut ctx, &self.withdraw, &request, policy, timeout)
            .await?;
        let withdrawal_token = match withdrawal {
            Ok(token) => token,
            Err(withdrawal_error) => {
                let outcome = SagaOutcome::WithdrawalFailed { withdrawal_error };
                return self.finish(&mut ctx, outcome, started).await;
            }
        };

        let deposit = self
            .engine
            .run_step(&mut ctx, &self.deposit, &request, policy, timeout)
            .await?;
        let deposit_error = match deposit {
            Ok(deposit_token) => {
                let outcome = SagaOutcome::Completed {
                    withdrawal_token,
                    deposit_token,
                };
                return self.finish(&mut ctx, outcome, started).await;
            }
            Err(err) => err,
        };

        tracing::warn!(error = %deposit_error, "deposit failed, compensating");
        let refund = self
            .engine
            .run_step(&mut ctx, &self.refund, &request, policy, timeout)
            .await?;
        let outcome = match refund {
            Ok(refund_token) => SagaOutcome::CompensatedFailure {
                deposit_error,
                refund_token,
            },
            Err(refund_error) => SagaOutcome::UncompensatedFailure {
                deposit_error,
                refund_error,
            },
        };
        self.finish(&mut ctx, outcome, started).await
    }

    async fn finish(
        &self,
        ctx: &mut WorkflowContext,
        outcome: SagaOutcome,
        started: Instant,
    ) -> Result<SagaOutcome> {
        self.engine.finish(ctx, outcome.clone()).await?;

        let duration = started.elapsed().as_secs_f64();
        metrics::histogram!("transfer_saga_duration_seconds").record(duration);
        metrics::counter!("transfer_saga_outcome_total", "outcome" => outcome.as_str())
            .increment(1);

        match outcome.severity() {
            Severity::Info => tracing::info!(duration, %outcome, "transfer finished"),
            Severity::Warning => tracing::warn!(duration, %outcome, "transfer failed"),
            Severity::Critical => {
                metrics::counter!("transfer_uncompensated_total").increment(1);
                let request = ctx.instance().request();
                tracing::error!(
                    source_account = request.map(|r| r.source_account.as_str()),
                    amount = request.map(|r| r.amount),
                    %outcome,
                    "transfer failed and could not be compensated, manual intervention required"
                );
            }
        }

        Ok(outcome)
    }

    /// Rebuilds the state of a transfer from its history.
    pub async fn status(&self, reference_id: &ReferenceId) -> Result<Option<TransferSagaInstance>> {
        self.engine.load(&WorkflowId::for_transfer(reference_id)).await
    }

    /// Requests cancellation of a transfer.
    ///
    /// Accepted only while the withdrawal is still in progress; it takes
    /// effect at the withdrawal's next retry backoff and ends the workflow
    /// with [`SagaOutcome::WithdrawalFailed`]. A withdrawal attempt already
    /// in flight still completes, and the transfer carries on.
    #[tracing::instrument(skip(self), fields(reference_id = %reference_id))]
    pub async fn cancel(&self, reference_id: &ReferenceId) -> Result<()> {
        let workflow_id = WorkflowId::for_transfer(reference_id);
        match self.engine.cancel(&workflow_id).await {
            Ok(()) => {
                tracing::info!(%workflow_id, "cancellation requested");
                Ok(())
            }
            Err(SagaError::CancellationRejected { workflow_id, phase }) => {
                tracing::warn!(%phase, "cancellation rejected");
                Err(SagaError::CancellationRejected { workflow_id, phase })
            }
            Err(err) => Err(err),
        }
    }

    /// Transfers that ended with funds held by nobody.
    pub async fn stuck(&self) -> Result<Vec<TransferSagaInstance>> {
        let ended = self
            .engine
            .store()
            .events_by_type("TransferUncompensated")
            .await?;

        let mut seen = HashSet::new();
        let mut stuck = Vec::new();
        for event in ended {
            if !seen.insert(event.workflow_id.clone()) {
                continue;
            }
            if let Some(instance) = self.engine.load(&event.workflow_id).await? {
                stuck.push(instance);
            }
        }
        Ok(stuck)
    }

    /// Workflows with a start event but no terminal event.
    pub async fn incomplete_workflows(&self) -> Result<Vec<WorkflowId>> {
        let mut started = BTreeSet::new();
        let mut finished = HashSet::new();

        let mut events = self.engine.store().stream_all().await?;
        while let Some(event) = events.next().await {
            let event = event?;
            if event.event_type == "TransferStarted" {
                started.insert(event.workflow_id);
            } else if TERMINAL_EVENT_TYPES.contains(&event.event_type.as_str()) {
                finished.insert(event.workflow_id);
            }
        }

        self.engine
            .retain_pending_cancellations(|id| started.contains(id) && !finished.contains(id));

        Ok(started
            .into_iter()
            .filter(|id| !finished.contains(id) && !self.engine.is_running(id))
            .collect())
    }
}

impl<S, L> TransferSaga<S, L>
where
    S: HistoryStore + 'static,
    L: LedgerClient + 'static,
{
    /// Resumes every unfinished workflow found in the history store.
    ///
    /// Each workflow runs on its own task, so one stuck in a long retry
    /// backoff does not hold back the others. Outcomes are returned in
    /// completion order. Failures to resume one workflow are logged and do
    /// not stop the others.
    #[tracing::instrument(skip(self))]
    pub async fn recover_incomplete(self: &Arc<Self>) -> Result<Vec<(WorkflowId, SagaOutcome)>> {
        let pending = self.incomplete_workflows().await?;
        if !pending.is_empty() {
            tracing::info!(count = pending.len(), "recovering incomplete workflows");
        }

        let mut in_flight = JoinSet::new();
        for workflow_id in pending {
            let saga = Arc::clone(self);
            in_flight.spawn(async move {
                let outcome = saga.resume(&workflow_id).await;
                (workflow_id, outcome)
            });
        }

        let mut recovered = Vec::with_capacity(in_flight.len());
        while let Some(joined) = in_flight.join_next().await {
            match joined {
                Ok((workflow_id, Ok(outcome))) => recovered.push((workflow_id, outcome)),
                Ok((workflow_id, Err(err))) => {
                    tracing::error!(%workflow_id, error = %err, "failed to recover workflow")
                }
                Err(err) => tracing::error!(error = %err, "recovery task panicked"),
            }
        }
        Ok(recovered)
    }
}
