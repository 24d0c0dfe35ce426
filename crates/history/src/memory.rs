use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    HistoryError, HistoryEvent, Result, Sequence, WorkflowId,
    store::{AppendOptions, HistoryStore, HistoryStream, validate_append},
};

#[derive(Default)]
struct Inner {
    /// Every event in recording order.
    log: Vec<HistoryEvent>,
    /// Positions in `log` per workflow, in sequence order.
    index: HashMap<WorkflowId, Vec<usize>>,
}

impl Inner {
    fn workflow_events(&self, workflow_id: &WorkflowId) -> impl Iterator<Item = &HistoryEvent> {
        self.index
            .get(workflow_id)
            .into_iter()
            .flatten()
            .map(|&pos| &self.log[pos])
    }

    fn last_sequence(&self, workflow_id: &WorkflowId) -> Option<Sequence> {
        self.workflow_events(workflow_id).map(|e| e.sequence).last()
    }
}

/// In-memory history store.
///
/// Offers the same guarantees as the PostgreSQL store for the lifetime of
/// the process; used by tests and by workers started without a database.
#[derive(Clone, Default)]
pub struct InMemoryHistoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryHistoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.inner.read().await.log.len()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, events: Vec<HistoryEvent>, options: AppendOptions) -> Result<Sequence> {
        validate_append(&events)?;

        let workflow_id = events[0].workflow_id.clone();
        let first_new = events[0].sequence;

        let mut inner = self.inner.write().await;
        let current = inner
            .last_sequence(&workflow_id)
            .unwrap_or(Sequence::initial());

        if let Some(expected) = options.expected_sequence
            && current != expected
        {
            return Err(HistoryError::SequenceConflict {
                workflow_id,
                expected,
                actual: current,
            });
        }

        // Simulates the unique (workflow_id, sequence) constraint.
        if first_new <= current {
            return Err(HistoryError::SequenceConflict {
                workflow_id,
                expected: options.expected_sequence.unwrap_or(current),
                actual: current,
            });
        }

        let count = events.len();
        let last = events
            .last()
            .map(|e| e.sequence)
            .unwrap_or(Sequence::initial());
        for event in events {
            let pos = inner.log.len();
            inner.log.push(event);
            inner.index.entry(workflow_id.clone()).or_default().push(pos);
        }

        metrics::counter!("history_events_appended_total").increment(count as u64);
        Ok(last)
    }

    async fn load(&self, workflow_id: &WorkflowId) -> Result<Vec<HistoryEvent>> {
        let inner = self.inner.read().await;
        Ok(inner.workflow_events(workflow_id).cloned().collect())
    }

    async fn load_from(
        &self,
        workflow_id: &WorkflowId,
        from: Sequence,
    ) -> Result<Vec<HistoryEvent>> {
        let inner = self.inner.read().await;
        Ok(inner
            .workflow_events(workflow_id)
            .filter(|e| e.sequence >= from)
            .cloned()
            .collect())
    }

    async fn events_by_type(&self, event_type: &str) -> Result<Vec<HistoryEvent>> {
        let inner = self.inner.read().await;
        Ok(inner
            .log
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect())
    }

    async fn stream_all(&self) -> Result<HistoryStream> {
        use futures_util::stream;

        let events = self.inner.read().await.log.clone();
        Ok(Box::pin(stream::iter(events.into_iter().map(Ok))))
    }

    async fn last_sequence(&self, workflow_id: &WorkflowId) -> Result<Option<Sequence>> {
        Ok(self.inner.read().await.last_sequence(workflow_id))
    }
}
