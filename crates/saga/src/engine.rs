//! In-process durable execution engine.
//!
//! Every step result is appended to the workflow history before it is handed
//! back to the orchestrator. Replaying the history therefore yields the exact
//! position of a workflow after a restart, and a step that already has a
//! recorded result is never executed again.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use common::WorkflowId;
use domain::{Aggregate, DomainEvent, TransferRequest};
use history::{AppendOptions, HistoryError, HistoryEvent, HistoryStore};
use ledger::ConfirmationToken;
use tokio::sync::watch;

use crate::aggregate::TransferSagaInstance;
use crate::error::{Result, SagaError, StepError};
use crate::events::TransferSagaEvent;
use crate::outcome::SagaOutcome;
use crate::retry::RetryPolicy;
use crate::state::SagaPhase;
use crate::steps::{StepFunction, StepKind};

/// Result of one step: a confirmation or the error that ended the step.
pub type StepResult = std::result::Result<ConfirmationToken, StepError>;

/// A workflow held by a context in this process.
#[derive(Debug)]
struct Run {
    cancel: watch::Sender<bool>,
    /// Phase after the last append; `Start` until the history is loaded.
    phase: SagaPhase,
}

#[derive(Debug, Default)]
struct Registry {
    running: HashMap<WorkflowId, Run>,
    /// Accepted cancellations for workflows no context holds yet.
    pending_cancellations: HashSet<WorkflowId>,
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Marks a workflow as running in this process until dropped.
struct RunGuard {
    registry: Arc<Mutex<Registry>>,
    workflow_id: WorkflowId,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        lock(&self.registry).running.remove(&self.workflow_id);
    }
}

/// A workflow being driven by this process.
///
/// Holds the state replayed from history and is updated as events are
/// appended. Dropping the context releases the workflow.
pub struct WorkflowContext {
    workflow_id: WorkflowId,
    instance: TransferSagaInstance,
    cancel: watch::Receiver<bool>,
    resumed: bool,
    _guard: RunGuard,
}

impl WorkflowContext {
    pub fn workflow_id(&self) -> &WorkflowId {
        &self.workflow_id
    }

    /// The state rebuilt from history so far.
    pub fn instance(&self) -> &TransferSagaInstance {
        &self.instance
    }

    /// True if the workflow had history before this run picked it up.
    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Returns the request the workflow was started with.
    pub fn request(&self) -> Result<TransferRequest> {
        self.instance
            .request()
            .cloned()
            .ok_or_else(|| SagaError::CorruptHistory {
                workflow_id: self.workflow_id.clone(),
                reason: "missing TransferStarted event".to_string(),
            })
    }
}

fn signal_cancel(workflow_id: &WorkflowId, run: &Run) -> Result<()> {
    if !run.phase.can_cancel() {
        return Err(SagaError::CancellationRejected {
            workflow_id: workflow_id.clone(),
            phase: run.phase,
        });
    }
    run.cancel.send_replace(true);
    Ok(())
}

/// Resolves once cancellation has been requested.
async fn cancellation_requested(cancel: &mut watch::Receiver<bool>) {
    let closed = cancel.wait_for(|cancelled| *cancelled).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

/// Durable step executor backed by a [`HistoryStore`].
///
/// Guarantees at most one logical execution per workflow id: histories are
/// appended under an expected sequence, and a workflow can only be driven by
/// one context at a time within the process.
pub struct DurableEngine<S: HistoryStore> {
    store: S,
    registry: Arc<Mutex<Registry>>,
}

impl<S: HistoryStore> DurableEngine<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns true if a context currently holds the workflow.
    pub fn is_running(&self, workflow_id: &WorkflowId) -> bool {
        lock(&self.registry).running.contains_key(workflow_id)
    }

    fn acquire(&self, workflow_id: &WorkflowId) -> Result<(RunGuard, watch::Receiver<bool>)> {
        let mut registry = lock(&self.registry);
        if registry.running.contains_key(workflow_id) {
            return Err(SagaError::AlreadyRunning(workflow_id.clone()));
        }
        let cancelled = registry.pending_cancellations.remove(workflow_id);
        let (sender, cancel) = watch::channel(cancelled);
        registry.running.insert(
            workflow_id.clone(),
            Run {
                cancel: sender,
                phase: SagaPhase::Start,
            },
        );
        let guard = RunGuard {
            registry: Arc::clone(&self.registry),
            workflow_id: workflow_id.clone(),
        };
        Ok((guard, cancel))
    }

    fn track_phase(&self, workflow_id: &WorkflowId, phase: SagaPhase) {
        if let Some(run) = lock(&self.registry).running.get_mut(workflow_id) {
            run.phase = phase;
        }
    }

    /// Rebuilds a workflow from its history.
    pub async fn load(&self, workflow_id: &WorkflowId) -> Result<Option<TransferSagaInstance>> {
        let history = self.store.load(workflow_id).await?;
        Ok(domain::replay(&history)?)
    }

    /// Starts a workflow for the request, or picks up its existing history.
    #[tracing::instrument(skip(self, request), fields(workflow_id = %request.workflow_id()))]
    pub async fn start(&self, request: &TransferRequest, task_queue: &str) -> Result<WorkflowContext> {
        let workflow_id = request.workflow_id();
        let (guard, cancel) = self.acquire(&workflow_id)?;

        let (instance, resumed) = match self.load(&workflow_id).await? {
            Some(existing) => (existing, true),
            None => {
                let mut instance = TransferSagaInstance::default();
                let started = TransferSagaEvent::transfer_started(
                    workflow_id.clone(),
                    request.clone(),
                    task_queue,
                );
                match self.append(&workflow_id, &mut instance, started).await {
                    Ok(()) => {
                        metrics::counter!("transfer_saga_started_total").increment(1);
                        tracing::info!(reference_id = %request.reference_id, "workflow started");
                        (instance, false)
                    }
                    // Another process recorded the start first.
                    Err(SagaError::History(HistoryError::SequenceConflict { .. })) => {
                        let existing = self
                            .load(&workflow_id)
                            .await?
                            .ok_or_else(|| SagaError::WorkflowNotFound(workflow_id.clone()))?;
                        (existing, true)
                    }
                    Err(err) => return Err(err),
                }
            }
        };

        if instance.request() != Some(request) {
            return Err(SagaError::ReferenceConflict { workflow_id });
        }
        if resumed {
            self.track_phase(&workflow_id, instance.phase());
            tracing::info!(phase = %instance.phase(), "workflow has history, replaying");
        }

        Ok(WorkflowContext {
            workflow_id,
            instance,
            cancel,
            resumed,
            _guard: guard,
        })
    }

    /// Picks up an existing workflow from its history.
    #[tracing::instrument(skip(self), fields(workflow_id = %workflow_id))]
    pub async fn resume(&self, workflow_id: &WorkflowId) -> Result<WorkflowContext> {
        let (guard, cancel) = self.acquire(workflow_id)?;
        let instance = self
            .load(workflow_id)
            .await?
            .ok_or_else(|| SagaError::WorkflowNotFound(workflow_id.clone()))?;

        self.track_phase(workflow_id, instance.phase());
        tracing::info!(phase = %instance.phase(), "resuming workflow");
        let context = WorkflowContext {
            workflow_id: workflow_id.clone(),
            instance,
            cancel,
            resumed: true,
            _guard: guard,
        };
        context.request()?;
        Ok(context)
    }

    /// Requests cancellation of a workflow.
    ///
    /// Accepted only while the workflow is withdrawing. For a workflow held
    /// by a context in this process the decision is made against its live
    /// phase, under the same lock the context updates when it records a step
    /// result. Otherwise the history decides, and the flag waits for the next
    /// context that picks the workflow up.
    ///
    /// Observed by cancellable steps before an attempt and while waiting out
    /// a retry backoff. An in-flight ledger call is never interrupted, so an
    /// accepted cancellation can still lose to an attempt that succeeds.
    pub async fn cancel(&self, workflow_id: &WorkflowId) -> Result<()> {
        {
            let registry = lock(&self.registry);
            if let Some(run) = registry.running.get(workflow_id) {
                if run.phase != SagaPhase::Start {
                    return signal_cancel(workflow_id, run);
                }
            }
        }

        let phase = self
            .load(workflow_id)
            .await?
            .ok_or_else(|| SagaError::WorkflowNotFound(workflow_id.clone()))?
            .phase();
        if !phase.can_cancel() {
            return Err(SagaError::CancellationRejected {
                workflow_id: workflow_id.clone(),
                phase,
            });
        }

        let mut guard = lock(&self.registry);
        let registry = &mut *guard;
        match registry.running.get(workflow_id) {
            // Picked up while the history was loading.
            Some(run) if run.phase == SagaPhase::Start => {
                run.cancel.send_replace(true);
                Ok(())
            }
            Some(run) => signal_cancel(workflow_id, run),
            None => {
                registry.pending_cancellations.insert(workflow_id.clone());
                Ok(())
            }
        }
    }

    /// Drops pending cancellations for workflows `keep` rejects.
    ///
    /// A pending flag outlives its workflow when another process finishes
    /// it; the recovery scan uses this to forget those.
    pub fn retain_pending_cancellations(&self, keep: impl Fn(&WorkflowId) -> bool) {
        lock(&self.registry)
            .pending_cancellations
            .retain(|workflow_id| keep(workflow_id));
    }

    /// Executes a step durably.
    ///
    /// Returns the recorded result if the history already holds one.
    /// Otherwise runs attempts under `timeout`, appending every attempt and
    /// its result, and retries according to `policy`. The outer error is an
    /// infrastructure failure; the inner result is the step's own outcome.
    #[tracing::instrument(
        skip(self, ctx, step, request, policy),
        fields(workflow_id = %ctx.workflow_id, step = %step.kind())
    )]
    pub async fn run_step(
        &self,
        ctx: &mut WorkflowContext,
        step: &dyn StepFunction,
        request: &TransferRequest,
        policy: &RetryPolicy,
        timeout: Duration,
    ) -> Result<StepResult> {
        let kind = step.kind();
        if let Some(recorded) = ctx.instance.step(kind).result() {
            tracing::debug!("step result recorded in history, skipping execution");
            return Ok(recorded);
        }

        let mut attempt = ctx.instance.step(kind).attempts;
        loop {
            if kind.is_cancellable() && ctx.is_cancelled() {
                return self.cancelled(ctx, kind, attempt).await;
            }

            attempt += 1;
            self.record(ctx, TransferSagaEvent::step_scheduled(kind, attempt))
                .await?;
            metrics::counter!("transfer_step_attempts_total", "step" => kind.as_str()).increment(1);

            let result = match tokio::time::timeout(timeout, step.execute(request)).await {
                Ok(Ok(token)) => Ok(token),
                Ok(Err(err)) => Err(StepError::Ledger(err)),
                Err(_) => Err(StepError::Timeout {
                    step: kind,
                    after_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                }),
            };

            let error = match result {
                Ok(token) => {
                    if kind.is_cancellable() && ctx.is_cancelled() {
                        tracing::warn!(
                            attempt,
                            "cancellation arrived while the attempt was in flight, step completed"
                        );
                    }
                    self.record(
                        ctx,
                        TransferSagaEvent::step_completed(kind, token.clone(), attempt),
                    )
                    .await?;
                    return Ok(Ok(token));
                }
                Err(error) => error,
            };

            let Some(delay) = policy.next_delay(&error, attempt) else {
                tracing::warn!(attempt, error = %error, "step failed");
                self.record(
                    ctx,
                    TransferSagaEvent::step_failed(kind, error.clone(), attempt),
                )
                .await?;
                return Ok(Err(error));
            };

            tracing::warn!(attempt, error = %error, delay_ms = delay.as_millis() as u64, "step attempt failed, retrying");
            self.record(
                ctx,
                TransferSagaEvent::step_attempt_failed(kind, attempt, error, delay),
            )
            .await?;
            metrics::counter!("transfer_step_retries_total", "step" => kind.as_str()).increment(1);

            if kind.is_cancellable() {
                let interrupted = tokio::select! {
                    _ = tokio::time::sleep(delay) => false,
                    _ = cancellation_requested(&mut ctx.cancel) => true,
                };
                if interrupted {
                    return self.cancelled(ctx, kind, attempt).await;
                }
            } else {
                tokio::time::sleep(delay).await;
            }
        }
    }

    async fn cancelled(
        &self,
        ctx: &mut WorkflowContext,
        kind: StepKind,
        attempts: u32,
    ) -> Result<StepResult> {
        let error = StepError::Cancelled { step: kind };
        tracing::warn!(attempts, "step cancelled");
        self.record(ctx, TransferSagaEvent::step_failed(kind, error.clone(), attempts))
            .await?;
        Ok(Err(error))
    }

    /// Records the terminal outcome of a workflow.
    pub async fn finish(&self, ctx: &mut WorkflowContext, outcome: SagaOutcome) -> Result<()> {
        self.record(ctx, TransferSagaEvent::transfer_ended(outcome)).await
    }

    async fn record(&self, ctx: &mut WorkflowContext, event: TransferSagaEvent) -> Result<()> {
        self.append(&ctx.workflow_id, &mut ctx.instance, event).await
    }

    /// Appends one event at the instance's next sequence and applies it.
    async fn append(
        &self,
        workflow_id: &WorkflowId,
        instance: &mut TransferSagaInstance,
        event: TransferSagaEvent,
    ) -> Result<()> {
        let current = instance.sequence();
        let stored = HistoryEvent::builder()
            .workflow_id(workflow_id.clone())
            .workflow_type(TransferSagaInstance::aggregate_type())
            .event_type(event.event_type())
            .sequence(current.next())
            .payload(&event)?
            .build()?;

        let sequence = self
            .store
            .append(vec![stored], AppendOptions::expect_sequence(current))
            .await?;

        instance.apply(event);
        instance.set_sequence(sequence);
        self.track_phase(workflow_id, instance.phase());
        Ok(())
    }
}
