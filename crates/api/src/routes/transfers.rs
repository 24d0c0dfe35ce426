//! Transfer submission, status and cancellation endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{ReferenceId, WorkflowId};
use domain::TransferRequest;
use history::HistoryStore;
use ledger::InMemoryLedger;
use saga::{SagaOutcome, SagaPhase, Severity, StepKind, StepRecord, TransferClient, TransferSaga, TransferSagaInstance};
use serde::Serialize;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: HistoryStore> {
    pub saga: Arc<TransferSaga<S, InMemoryLedger>>,
    pub client: TransferClient<S, InMemoryLedger>,
    pub ledger: Arc<InMemoryLedger>,
}

// -- Response types --

#[derive(Serialize)]
pub struct TransferOutcomeResponse {
    pub workflow_id: WorkflowId,
    pub outcome: SagaOutcome,
    pub severity: Severity,
}

#[derive(Serialize)]
pub struct StepsResponse {
    pub withdraw: StepRecord,
    pub deposit: StepRecord,
    pub refund: StepRecord,
}

#[derive(Serialize)]
pub struct TransferStatusResponse {
    pub workflow_id: Option<WorkflowId>,
    pub phase: SagaPhase,
    /// Step the saga is driving right now; `None` once finished.
    pub active_step: Option<StepKind>,
    pub request: Option<TransferRequest>,
    pub steps: StepsResponse,
    pub outcome: Option<SagaOutcome>,
}

impl From<&TransferSagaInstance> for TransferStatusResponse {
    fn from(instance: &TransferSagaInstance) -> Self {
        use domain::Aggregate;

        Self {
            workflow_id: instance.id().cloned(),
            phase: instance.phase(),
            active_step: instance.phase().active_step(),
            request: instance.request().cloned(),
            steps: StepsResponse {
                withdraw: instance.step(StepKind::Withdraw).clone(),
                deposit: instance.step(StepKind::Deposit).clone(),
                refund: instance.step(StepKind::Refund).clone(),
            },
            outcome: instance.outcome().cloned(),
        }
    }
}

#[derive(Serialize)]
pub struct CancelResponse {
    pub workflow_id: WorkflowId,
    pub status: &'static str,
}

// -- Handlers --

/// POST /transfers — run a transfer and wait for its outcome.
#[tracing::instrument(skip(state, request), fields(reference_id = %request.reference_id))]
pub async fn create<S: HistoryStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(request): Json<TransferRequest>,
) -> Result<Json<TransferOutcomeResponse>, ApiError> {
    let workflow_id = request.workflow_id();
    let outcome = state.client.execute(request).await?;

    Ok(Json(TransferOutcomeResponse {
        workflow_id,
        severity: outcome.severity(),
        outcome,
    }))
}

/// GET /transfers/{reference_id} — transfer state rebuilt from history.
#[tracing::instrument(skip(state))]
pub async fn get<S: HistoryStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(reference_id): Path<String>,
) -> Result<Json<TransferStatusResponse>, ApiError> {
    let reference_id = ReferenceId::new(reference_id);
    let instance = state
        .saga
        .status(&reference_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Transfer {reference_id} not found")))?;

    Ok(Json(TransferStatusResponse::from(&instance)))
}

/// POST /transfers/{reference_id}/cancel — request cancellation.
#[tracing::instrument(skip(state))]
pub async fn cancel<S: HistoryStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(reference_id): Path<String>,
) -> Result<(StatusCode, Json<CancelResponse>), ApiError> {
    let reference_id = ReferenceId::new(reference_id);
    state.client.cancel(&reference_id).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(CancelResponse {
            workflow_id: WorkflowId::for_transfer(&reference_id),
            status: "cancellation requested",
        }),
    ))
}

/// GET /transfers/stuck — transfers that need manual intervention.
#[tracing::instrument(skip(state))]
pub async fn stuck<S: HistoryStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<TransferStatusResponse>>, ApiError> {
    let stuck = state.saga.stuck().await?;
    Ok(Json(stuck.iter().map(TransferStatusResponse::from).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::Aggregate;
    use ledger::ConfirmationToken;
    use saga::TransferSagaEvent;

    fn started() -> TransferSagaInstance {
        let request = TransferRequest::new("85-150", "43-812", 250, "tx-9");
        let mut instance = TransferSagaInstance::default();
        instance.apply(TransferSagaEvent::transfer_started(
            request.workflow_id(),
            request,
            "TRANSFER_MONEY_TASK_QUEUE",
        ));
        instance
    }

    #[test]
    fn status_reports_step_in_progress() {
        let mut instance = started();
        let status = TransferStatusResponse::from(&instance);
        assert_eq!(status.active_step, Some(StepKind::Withdraw));

        instance.apply_events(vec![
            TransferSagaEvent::step_scheduled(StepKind::Withdraw, 1),
            TransferSagaEvent::step_completed(StepKind::Withdraw, ConfirmationToken::new("W1"), 1),
        ]);
        let status = TransferStatusResponse::from(&instance);
        assert_eq!(status.phase, SagaPhase::Depositing);
        assert_eq!(status.active_step, Some(StepKind::Deposit));

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["active_step"], "deposit");
        assert_eq!(json["steps"]["withdraw"]["token"], "W1");
    }
}
