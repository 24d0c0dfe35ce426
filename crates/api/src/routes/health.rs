//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use history::HistoryStore;
use serde::Serialize;

use crate::routes::transfers::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub task_queue: String,
}

/// GET /health — liveness plus the task queue this process serves.
pub async fn check<S: HistoryStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        task_queue: state.client.task_queue().to_string(),
    })
}
