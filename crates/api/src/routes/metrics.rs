//! Prometheus scrape endpoint.

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;

const PROMETHEUS_TEXT: &str = "text/plain; version=0.0.4; charset=utf-8";

/// GET /metrics — saga, step and history counters in text exposition format.
pub async fn get(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    ([(CONTENT_TYPE, PROMETHEUS_TEXT)], handle.render())
}

/// Registers descriptions for the metrics this service emits.
pub fn describe() {
    metrics::describe_counter!("transfer_saga_started_total", "Transfers accepted for execution");
    metrics::describe_counter!(
        "transfer_saga_outcome_total",
        "Finished transfers by outcome"
    );
    metrics::describe_counter!(
        "transfer_step_attempts_total",
        "Ledger step attempts by step"
    );
    metrics::describe_counter!(
        "transfer_step_retries_total",
        "Ledger step retries scheduled by step"
    );
    metrics::describe_counter!(
        "transfer_uncompensated_total",
        "Transfers that withdrew funds and could not refund them"
    );
    metrics::describe_histogram!(
        "transfer_saga_duration_seconds",
        metrics::Unit::Seconds,
        "Wall time from start to outcome"
    );
    metrics::describe_counter!(
        "history_events_appended_total",
        "Events appended to workflow histories"
    );
}
