use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{HistoryError, HistoryEvent, Result, Sequence, WorkflowId};

/// Options for appending events to a workflow history.
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// Sequence the history is expected to be at before the append.
    /// If None, no check is performed.
    pub expected_sequence: Option<Sequence>,
}

impl AppendOptions {
    /// Creates options with no sequence check.
    pub fn new() -> Self {
        Self::default()
    }

    /// Expects the history to currently end at `sequence`.
    pub fn expect_sequence(sequence: Sequence) -> Self {
        Self {
            expected_sequence: Some(sequence),
        }
    }

    /// Expects the workflow to have no history yet.
    pub fn expect_new() -> Self {
        Self {
            expected_sequence: Some(Sequence::initial()),
        }
    }
}

/// A stream of history events.
pub type HistoryStream = Pin<Box<dyn Stream<Item = Result<HistoryEvent>> + Send>>;

/// Durable, append-only storage for workflow histories.
///
/// Implementations must be thread-safe; many workflows append concurrently.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Appends events atomically - either all are stored or none are.
    ///
    /// Fails with `SequenceConflict` if `options.expected_sequence` does not
    /// match the workflow's current last sequence. Returns the new last
    /// sequence.
    async fn append(&self, events: Vec<HistoryEvent>, options: AppendOptions) -> Result<Sequence>;

    /// Loads the full history of a workflow, oldest first.
    async fn load(&self, workflow_id: &WorkflowId) -> Result<Vec<HistoryEvent>>;

    /// Loads a workflow's history starting at `from` (inclusive).
    async fn load_from(&self, workflow_id: &WorkflowId, from: Sequence)
    -> Result<Vec<HistoryEvent>>;

    /// Retrieves events of one type across all workflows, oldest first.
    async fn events_by_type(&self, event_type: &str) -> Result<Vec<HistoryEvent>>;

    /// Streams every stored event in recording order.
    async fn stream_all(&self) -> Result<HistoryStream>;

    /// Returns the last sequence of a workflow, or None if it has no history.
    async fn last_sequence(&self, workflow_id: &WorkflowId) -> Result<Option<Sequence>>;
}

/// Convenience methods available on every history store.
#[async_trait]
pub trait HistoryStoreExt: HistoryStore {
    /// Appends a single event.
    async fn append_event(&self, event: HistoryEvent, options: AppendOptions) -> Result<Sequence> {
        self.append(vec![event], options).await
    }

    /// Returns true if the workflow has any recorded history.
    async fn workflow_exists(&self, workflow_id: &WorkflowId) -> Result<bool> {
        Ok(self.last_sequence(workflow_id).await?.is_some())
    }
}

impl<T: HistoryStore + ?Sized> HistoryStoreExt for T {}

/// Checks a batch before it is appended: non-empty, one workflow, and
/// contiguous sequences.
pub fn validate_append(events: &[HistoryEvent]) -> Result<()> {
    let Some(first) = events.first() else {
        return Err(HistoryError::InvalidAppend(
            "cannot append an empty batch".to_string(),
        ));
    };

    let mut expected = first.sequence;
    for event in events.iter().skip(1) {
        if event.workflow_id != first.workflow_id {
            return Err(HistoryError::InvalidAppend(
                "all events must belong to the same workflow".to_string(),
            ));
        }
        expected = expected.next();
        if event.sequence != expected {
            return Err(HistoryError::InvalidAppend(format!(
                "sequences must be contiguous: expected {}, got {}",
                expected, event.sequence
            )));
        }
    }

    Ok(())
}
