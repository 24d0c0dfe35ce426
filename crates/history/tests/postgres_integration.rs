//! PostgreSQL history store integration tests
//!
//! These tests share one PostgreSQL container. Run with:
//!
//! ```bash
//! cargo test -p history --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use history::{
    AppendOptions, HistoryError, HistoryEvent, HistoryStore, HistoryStoreExt,
    PostgresHistoryStore, Sequence, WorkflowId,
};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();
            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_workflow_history.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_store() -> PostgresHistoryStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE workflow_history")
        .execute(&pool)
        .await
        .unwrap();

    PostgresHistoryStore::new(pool)
}

fn test_event(workflow_id: &WorkflowId, sequence: i64, event_type: &str) -> HistoryEvent {
    HistoryEvent::builder()
        .workflow_id(workflow_id.clone())
        .workflow_type("MoneyTransfer")
        .event_type(event_type)
        .sequence(Sequence::new(sequence))
        .payload_raw(serde_json::json!({"step": "withdraw"}))
        .build()
        .unwrap()
}

#[tokio::test]
async fn append_and_load_history() {
    let store = get_test_store().await;
    let wf = WorkflowId::new("transfer-pg-1");

    let last = store
        .append(
            vec![
                test_event(&wf, 1, "TransferStarted"),
                test_event(&wf, 2, "StepScheduled"),
            ],
            AppendOptions::expect_new(),
        )
        .await
        .unwrap();
    assert_eq!(last, Sequence::new(2));

    let events = store.load(&wf).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event_type, "TransferStarted");
    assert_eq!(events[1].sequence, Sequence::new(2));
}

#[tokio::test]
async fn expected_sequence_mismatch_conflicts() {
    let store = get_test_store().await;
    let wf = WorkflowId::new("transfer-pg-2");

    store
        .append(vec![test_event(&wf, 1, "TransferStarted")], AppendOptions::expect_new())
        .await
        .unwrap();

    let result = store
        .append(vec![test_event(&wf, 1, "TransferStarted")], AppendOptions::expect_new())
        .await;
    assert!(matches!(result, Err(HistoryError::SequenceConflict { .. })));
}

#[tokio::test]
async fn unique_constraint_rejects_duplicate_sequence() {
    let store = get_test_store().await;
    let wf = WorkflowId::new("transfer-pg-3");

    store
        .append(vec![test_event(&wf, 1, "TransferStarted")], AppendOptions::new())
        .await
        .unwrap();

    let result = store
        .append(vec![test_event(&wf, 1, "TransferStarted")], AppendOptions::new())
        .await;
    assert!(matches!(result, Err(HistoryError::SequenceConflict { .. })));
}

#[tokio::test]
async fn load_from_and_last_sequence() {
    let store = get_test_store().await;
    let wf = WorkflowId::new("transfer-pg-4");
    let batch = (1..=4).map(|s| test_event(&wf, s, "Tick")).collect();
    store.append(batch, AppendOptions::new()).await.unwrap();

    let tail = store.load_from(&wf, Sequence::new(3)).await.unwrap();
    assert_eq!(tail.len(), 2);
    assert_eq!(store.last_sequence(&wf).await.unwrap(), Some(Sequence::new(4)));
    assert!(store.workflow_exists(&wf).await.unwrap());
    assert!(
        !store
            .workflow_exists(&WorkflowId::new("transfer-pg-none"))
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn events_by_type_and_stream_all() {
    use futures_util::StreamExt;

    let store = get_test_store().await;
    let a = WorkflowId::new("transfer-pg-a");
    let b = WorkflowId::new("transfer-pg-b");

    store
        .append(vec![test_event(&a, 1, "TransferUncompensated")], AppendOptions::new())
        .await
        .unwrap();
    store
        .append(vec![test_event(&b, 1, "TransferCompleted")], AppendOptions::new())
        .await
        .unwrap();

    let stuck = store.events_by_type("TransferUncompensated").await.unwrap();
    assert_eq!(stuck.len(), 1);
    assert_eq!(stuck[0].workflow_id, a);

    let all: Vec<_> = store.stream_all().await.unwrap().collect().await;
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].as_ref().unwrap().workflow_id, a);
}

#[tokio::test]
async fn metadata_roundtrips() {
    let store = get_test_store().await;
    let wf = WorkflowId::new("transfer-pg-5");

    let event = HistoryEvent::builder()
        .workflow_id(wf.clone())
        .workflow_type("MoneyTransfer")
        .event_type("TransferStarted")
        .sequence(Sequence::first())
        .payload_raw(serde_json::json!({}))
        .metadata("task_queue", serde_json::json!("TRANSFER_MONEY_TASK_QUEUE"))
        .build()
        .unwrap();
    store.append_event(event, AppendOptions::expect_new()).await.unwrap();

    let loaded = store.load(&wf).await.unwrap();
    assert_eq!(
        loaded[0].metadata.get("task_queue"),
        Some(&serde_json::json!("TRANSFER_MONEY_TASK_QUEUE"))
    );
}
