//! HTTP API and worker host for the transfer saga.
//!
//! Provides REST endpoints to submit, inspect and cancel transfers, with
//! structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use history::HistoryStore;
use ledger::InMemoryLedger;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{SagaConfig, TransferSaga, TransferWorker};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use routes::transfers::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: HistoryStore + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route("/transfers", post(routes::transfers::create::<S>))
        .route("/transfers/stuck", get(routes::transfers::stuck::<S>))
        .route("/transfers/{reference_id}", get(routes::transfers::get::<S>))
        .route(
            "/transfers/{reference_id}/cancel",
            post(routes::transfers::cancel::<S>),
        )
        .route("/accounts/{account}", get(routes::accounts::get::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the saga, its task queue and the ledger into application state.
///
/// The returned worker must be spawned for submitted transfers to run.
pub fn create_default_state<S: HistoryStore + 'static>(
    store: S,
    ledger: Arc<InMemoryLedger>,
    config: SagaConfig,
    queue_capacity: usize,
) -> (Arc<AppState<S>>, TransferWorker<S, InMemoryLedger>) {
    let saga = Arc::new(TransferSaga::new(store, Arc::clone(&ledger), config));
    let (worker, client) = saga::task_queue(Arc::clone(&saga), queue_capacity);

    let state = Arc::new(AppState {
        saga,
        client,
        ledger,
    });

    (state, worker)
}
