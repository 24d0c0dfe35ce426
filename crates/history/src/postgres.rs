use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    EventId, HistoryError, HistoryEvent, Result, Sequence, WorkflowId,
    store::{AppendOptions, HistoryStore, HistoryStream, validate_append},
};

const SELECT_COLUMNS: &str = "SELECT id, workflow_id, workflow_type, sequence, event_type, recorded_at, payload, metadata FROM workflow_history";

const STREAM_ALL_SQL: &str = "SELECT id, workflow_id, workflow_type, sequence, event_type, recorded_at, payload, metadata FROM workflow_history ORDER BY position ASC";

/// PostgreSQL-backed history store.
#[derive(Clone)]
pub struct PostgresHistoryStore {
    pool: PgPool,
}

impl PostgresHistoryStore {
    /// Creates a store over an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `database_url` and returns a store.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_event(row: PgRow) -> Result<HistoryEvent> {
        let metadata_json: serde_json::Value = row.try_get("metadata")?;
        let metadata: HashMap<String, serde_json::Value> = serde_json::from_value(metadata_json)?;

        Ok(HistoryEvent {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            workflow_id: WorkflowId::new(row.try_get::<String, _>("workflow_id")?),
            workflow_type: row.try_get("workflow_type")?,
            sequence: Sequence::new(row.try_get("sequence")?),
            event_type: row.try_get("event_type")?,
            recorded_at: row.try_get("recorded_at")?,
            payload: row.try_get("payload")?,
            metadata,
        })
    }
}

#[async_trait]
impl HistoryStore for PostgresHistoryStore {
    async fn append(&self, events: Vec<HistoryEvent>, options: AppendOptions) -> Result<Sequence> {
        validate_append(&events)?;

        let workflow_id = events[0].workflow_id.clone();
        let mut tx = self.pool.begin().await?;

        if let Some(expected) = options.expected_sequence {
            let current: Option<i64> = sqlx::query_scalar(
                "SELECT MAX(sequence) FROM workflow_history WHERE workflow_id = $1",
            )
            .bind(workflow_id.as_str())
            .fetch_one(&mut *tx)
            .await?;

            let actual = Sequence::new(current.unwrap_or(0));
            if actual != expected {
                return Err(HistoryError::SequenceConflict {
                    workflow_id,
                    expected,
                    actual,
                });
            }
        }

        let count = events.len();
        let mut last = Sequence::initial();
        for event in &events {
            let metadata_json = serde_json::to_value(&event.metadata)?;

            sqlx::query(
                r#"
                INSERT INTO workflow_history (id, workflow_id, workflow_type, sequence, event_type, recorded_at, payload, metadata)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(event.event_id.as_uuid())
            .bind(event.workflow_id.as_str())
            .bind(&event.workflow_type)
            .bind(event.sequence.as_i64())
            .bind(&event.event_type)
            .bind(event.recorded_at)
            .bind(&event.payload)
            .bind(metadata_json)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                // Lost a race with another writer on the same workflow.
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("unique_workflow_sequence")
                {
                    return HistoryError::SequenceConflict {
                        workflow_id: workflow_id.clone(),
                        expected: options.expected_sequence.unwrap_or(Sequence::initial()),
                        actual: event.sequence,
                    };
                }
                HistoryError::Database(e)
            })?;

            last = event.sequence;
        }

        tx.commit().await?;
        metrics::counter!("history_events_appended_total").increment(count as u64);
        Ok(last)
    }

    async fn load(&self, workflow_id: &WorkflowId) -> Result<Vec<HistoryEvent>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE workflow_id = $1 ORDER BY sequence ASC"
        ))
        .bind(workflow_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn load_from(
        &self,
        workflow_id: &WorkflowId,
        from: Sequence,
    ) -> Result<Vec<HistoryEvent>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE workflow_id = $1 AND sequence >= $2 ORDER BY sequence ASC"
        ))
        .bind(workflow_id.as_str())
        .bind(from.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn events_by_type(&self, event_type: &str) -> Result<Vec<HistoryEvent>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE event_type = $1 ORDER BY position ASC"
        ))
        .bind(event_type)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn stream_all(&self) -> Result<HistoryStream> {
        use futures_util::StreamExt;

        let stream = sqlx::query(STREAM_ALL_SQL)
            .fetch(&self.pool)
            .map(|result| match result {
                Ok(row) => Self::row_to_event(row),
                Err(e) => Err(HistoryError::Database(e)),
            });

        Ok(Box::pin(stream))
    }

    async fn last_sequence(&self, workflow_id: &WorkflowId) -> Result<Option<Sequence>> {
        let sequence: Option<i64> =
            sqlx::query_scalar("SELECT MAX(sequence) FROM workflow_history WHERE workflow_id = $1")
                .bind(workflow_id.as_str())
                .fetch_one(&self.pool)
                .await?;

        Ok(sequence.map(Sequence::new))
    }
}
