//! Task-queue worker and its producer handle.

use std::sync::Arc;

use common::ReferenceId;
use domain::TransferRequest;
use history::HistoryStore;
use ledger::LedgerClient;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;

use crate::error::{Result, SagaError};
use crate::orchestrator::TransferSaga;
use crate::outcome::SagaOutcome;

/// Receiver for the outcome of a submitted transfer.
pub type OutcomeReceiver = oneshot::Receiver<Result<SagaOutcome>>;

/// One submitted transfer waiting for a worker.
struct TransferTask {
    request: TransferRequest,
    reply: oneshot::Sender<Result<SagaOutcome>>,
}

/// Creates a bounded task queue hosting `saga`.
///
/// The worker must be run (usually spawned) for submitted transfers to make
/// progress; it stops once every client has been dropped.
pub fn task_queue<S, L>(
    saga: Arc<TransferSaga<S, L>>,
    capacity: usize,
) -> (TransferWorker<S, L>, TransferClient<S, L>)
where
    S: HistoryStore + 'static,
    L: LedgerClient + 'static,
{
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let task_queue = saga.config().task_queue.clone();
    let worker = TransferWorker {
        task_queue: task_queue.clone(),
        receiver,
        saga: Arc::clone(&saga),
    };
    let client = TransferClient {
        task_queue,
        sender,
        saga,
    };
    (worker, client)
}

/// Consumes a task queue, running one tokio task per transfer.
pub struct TransferWorker<S: HistoryStore, L: LedgerClient> {
    task_queue: String,
    receiver: mpsc::Receiver<TransferTask>,
    saga: Arc<TransferSaga<S, L>>,
}

impl<S, L> TransferWorker<S, L>
where
    S: HistoryStore + 'static,
    L: LedgerClient + 'static,
{
    pub fn task_queue(&self) -> &str {
        &self.task_queue
    }

    /// Polls the queue until all clients are gone, then waits for the
    /// transfers still in flight.
    #[tracing::instrument(skip(self), fields(task_queue = %self.task_queue))]
    pub async fn run(mut self) {
        tracing::info!("worker polling task queue");
        let mut in_flight = JoinSet::new();

        while let Some(task) = self.receiver.recv().await {
            while in_flight.try_join_next().is_some() {}

            let saga = Arc::clone(&self.saga);
            in_flight.spawn(async move {
                let TransferTask { request, reply } = task;
                let outcome = saga.run(request).await;
                if reply.send(outcome).is_err() {
                    tracing::debug!("submitter went away before the outcome was ready");
                }
            });
        }

        tracing::info!(in_flight = in_flight.len(), "task queue closed, draining");
        while let Some(joined) = in_flight.join_next().await {
            if let Err(err) = joined {
                tracing::error!(error = %err, "transfer task panicked");
            }
        }
        tracing::info!("worker stopped");
    }
}

/// Producer handle for a task queue.
pub struct TransferClient<S: HistoryStore, L: LedgerClient> {
    task_queue: String,
    sender: mpsc::Sender<TransferTask>,
    saga: Arc<TransferSaga<S, L>>,
}

impl<S: HistoryStore, L: LedgerClient> Clone for TransferClient<S, L> {
    fn clone(&self) -> Self {
        Self {
            task_queue: self.task_queue.clone(),
            sender: self.sender.clone(),
            saga: Arc::clone(&self.saga),
        }
    }
}

impl<S: HistoryStore, L: LedgerClient> TransferClient<S, L> {
    pub fn task_queue(&self) -> &str {
        &self.task_queue
    }

    /// Enqueues a transfer; the receiver resolves with its outcome.
    ///
    /// Waits for queue capacity when the queue is full.
    pub async fn submit(&self, request: TransferRequest) -> Result<OutcomeReceiver> {
        let (reply, receiver) = oneshot::channel();
        self.sender
            .send(TransferTask { request, reply })
            .await
            .map_err(|_| self.unavailable())?;
        Ok(receiver)
    }

    /// Enqueues a transfer and waits for its outcome.
    pub async fn execute(&self, request: TransferRequest) -> Result<SagaOutcome> {
        let receiver = self.submit(request).await?;
        receiver.await.map_err(|_| self.unavailable())?
    }

    /// Requests cancellation of a transfer.
    pub async fn cancel(&self, reference_id: &ReferenceId) -> Result<()> {
        self.saga.cancel(reference_id).await
    }

    fn unavailable(&self) -> SagaError {
        SagaError::WorkerUnavailable {
            task_queue: self.task_queue.clone(),
        }
    }
}
