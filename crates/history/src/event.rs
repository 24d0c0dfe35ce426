use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{HistoryError, Result, WorkflowId};

/// Unique identifier for a recorded history event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an event ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of an event inside a workflow's history.
///
/// The first event of a workflow has sequence 1; an empty history is at
/// sequence 0. Appends are guarded by the expected sequence.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Sequence(i64);

impl Sequence {
    /// Creates a sequence from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// The position of an empty history.
    pub fn initial() -> Self {
        Self(0)
    }

    /// The position of the first event.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the following position.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Sequence {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// One entry in a workflow history: the serialized event plus the metadata
/// needed to store, order and route it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEvent {
    /// Unique identifier for this event.
    pub event_id: EventId,

    /// The workflow this event belongs to.
    pub workflow_id: WorkflowId,

    /// The kind of workflow (e.g. "MoneyTransfer").
    pub workflow_type: String,

    /// Position of the event in the workflow history.
    pub sequence: Sequence,

    /// The event name (e.g. "StepCompleted").
    pub event_type: String,

    /// When the event was recorded.
    pub recorded_at: DateTime<Utc>,

    /// The event payload as JSON.
    pub payload: serde_json::Value,

    /// Free-form metadata (correlation IDs, worker identity, ...).
    pub metadata: HashMap<String, serde_json::Value>,
}

impl HistoryEvent {
    /// Creates a new history event builder.
    pub fn builder() -> HistoryEventBuilder {
        HistoryEventBuilder::default()
    }
}

/// Builder for constructing history events.
#[derive(Debug, Default)]
pub struct HistoryEventBuilder {
    event_id: Option<EventId>,
    workflow_id: Option<WorkflowId>,
    workflow_type: Option<String>,
    sequence: Option<Sequence>,
    event_type: Option<String>,
    recorded_at: Option<DateTime<Utc>>,
    payload: Option<serde_json::Value>,
    metadata: HashMap<String, serde_json::Value>,
}

impl HistoryEventBuilder {
    /// Sets the event ID. If not set, a new ID will be generated.
    pub fn event_id(mut self, id: EventId) -> Self {
        self.event_id = Some(id);
        self
    }

    pub fn workflow_id(mut self, id: WorkflowId) -> Self {
        self.workflow_id = Some(id);
        self
    }

    pub fn workflow_type(mut self, workflow_type: impl Into<String>) -> Self {
        self.workflow_type = Some(workflow_type.into());
        self
    }

    pub fn sequence(mut self, sequence: Sequence) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Sets the timestamp. If not set, the current time will be used.
    pub fn recorded_at(mut self, recorded_at: DateTime<Utc>) -> Self {
        self.recorded_at = Some(recorded_at);
        self
    }

    /// Sets the payload from a serializable value.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> Result<Self> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    /// Sets the payload from a raw JSON value.
    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Adds a metadata entry.
    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Builds the event, failing if a required field is missing.
    pub fn build(self) -> Result<HistoryEvent> {
        fn missing(field: &str) -> HistoryError {
            HistoryError::InvalidAppend(format!("{field} is required"))
        }

        Ok(HistoryEvent {
            event_id: self.event_id.unwrap_or_default(),
            workflow_id: self.workflow_id.ok_or_else(|| missing("workflow_id"))?,
            workflow_type: self.workflow_type.ok_or_else(|| missing("workflow_type"))?,
            sequence: self.sequence.ok_or_else(|| missing("sequence"))?,
            event_type: self.event_type.ok_or_else(|| missing("event_type"))?,
            recorded_at: self.recorded_at.unwrap_or_else(Utc::now),
            payload: self.payload.ok_or_else(|| missing("payload"))?,
            metadata: self.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_ordering() {
        let s1 = Sequence::new(1);
        let s2 = Sequence::new(2);
        assert!(s1 < s2);
        assert_eq!(s1.next(), s2);
        assert_eq!(Sequence::initial().next(), Sequence::first());
    }

    #[test]
    fn builder_sets_all_fields() {
        let workflow_id = WorkflowId::new("transfer-tx-1");
        let payload = serde_json::json!({"step": "withdraw"});

        let event = HistoryEvent::builder()
            .workflow_id(workflow_id.clone())
            .workflow_type("MoneyTransfer")
            .sequence(Sequence::first())
            .event_type("StepScheduled")
            .payload_raw(payload.clone())
            .metadata("worker", serde_json::json!("w-1"))
            .build()
            .unwrap();

        assert_eq!(event.workflow_id, workflow_id);
        assert_eq!(event.workflow_type, "MoneyTransfer");
        assert_eq!(event.sequence, Sequence::first());
        assert_eq!(event.event_type, "StepScheduled");
        assert_eq!(event.payload, payload);
        assert_eq!(event.metadata.get("worker"), Some(&serde_json::json!("w-1")));
    }

    #[test]
    fn builder_reports_missing_field() {
        let result = HistoryEvent::builder()
            .workflow_id(WorkflowId::new("transfer-tx-1"))
            .build();
        assert!(matches!(result, Err(HistoryError::InvalidAppend(msg)) if msg.contains("workflow_type")));
    }
}
