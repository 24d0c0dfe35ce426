//! Transfer API server entry point.

use std::error::Error;
use std::sync::Arc;

use api::config::{Config, LogFormat};
use history::{HistoryStore, InMemoryHistoryStore, PostgresHistoryStore};
use ledger::InMemoryLedger;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let json = config.log_format == LogFormat::Json;
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

/// Hosts the worker and HTTP server on top of `store` until shutdown.
async fn serve<S: HistoryStore + 'static>(
    store: S,
    config: Config,
    metrics_handle: PrometheusHandle,
) -> Result<(), Box<dyn Error>> {
    let ledger = Arc::new(InMemoryLedger::with_accounts(config.ledger_seed.clone()));
    let (state, worker) = api::create_default_state(
        store,
        ledger,
        config.saga.clone(),
        config.worker_queue_capacity,
    );

    tracing::info!(task_queue = %worker.task_queue(), "starting transfer worker");
    let worker_handle = tokio::spawn(worker.run());

    // Workflows left mid-flight by a previous process.
    let saga = Arc::clone(&state.saga);
    tokio::spawn(async move {
        match saga.recover_incomplete().await {
            Ok(recovered) if !recovered.is_empty() => {
                tracing::info!(count = recovered.len(), "resumed incomplete transfers");
            }
            Ok(_) => {}
            Err(err) => tracing::error!(error = %err, "failed to resume incomplete transfers"),
        }
    });

    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router held the last client; the worker drains what is in flight.
    if let Err(err) = worker_handle.await {
        tracing::error!(error = %err, "transfer worker panicked");
    }

    tracing::info!("server shut down gracefully");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // 1. Load configuration and initialize tracing from it
    let config = Config::from_env();
    init_tracing(&config);
    for key in &config.invalid_keys {
        tracing::warn!(key = %key, "invalid configuration value, using default");
    }
    tracing::info!(
        task_queue = %config.saga.task_queue,
        max_attempts = config.saga.retry_policy.maximum_attempts,
        step_timeout_ms = config.saga.step_timeout.as_millis() as u64,
        "configuration loaded"
    );

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;
    api::routes::metrics::describe();

    // 3. Pick the history backend and run
    match config.database_url.clone() {
        Some(url) => {
            let store = PostgresHistoryStore::connect(&url).await?;
            store.run_migrations().await?;
            tracing::info!("using postgres workflow history");
            serve(store, config, metrics_handle).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, workflow history is in-memory only");
            serve(InMemoryHistoryStore::new(), config, metrics_handle).await
        }
    }
}
