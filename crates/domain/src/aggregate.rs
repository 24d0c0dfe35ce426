//! Core aggregate and domain event traits.

use common::WorkflowId;
use history::{HistoryEvent, Sequence};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::DomainError;

/// Trait for domain events.
///
/// Domain events are facts that already happened; they are named in the
/// past tense and never rejected when applied.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the event type name stored alongside the payload.
    fn event_type(&self) -> &'static str;
}

/// Trait for state rebuilt from a workflow history.
///
/// `apply` must be pure and deterministic: replaying the same history must
/// always produce the same state, which is what makes a workflow resumable
/// after a crash.
pub trait Aggregate: Default + Send + Sync + Sized {
    /// The type of events this aggregate consumes.
    type Event: DomainEvent;

    /// Returns the aggregate type name, recorded as the workflow type.
    fn aggregate_type() -> &'static str;

    /// Returns the owning workflow, or None before the first event.
    fn id(&self) -> Option<&WorkflowId>;

    /// Returns the sequence of the last applied event.
    fn sequence(&self) -> Sequence;

    /// Sets the sequence after replaying stored events.
    fn set_sequence(&mut self, sequence: Sequence);

    /// Applies an event to the aggregate, updating its state.
    fn apply(&mut self, event: Self::Event);

    /// Applies multiple events in sequence.
    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(event);
        }
    }
}

/// Rebuilds an aggregate by decoding and applying stored history events.
///
/// Returns None when the history is empty.
pub fn replay<A: Aggregate>(history: &[HistoryEvent]) -> Result<Option<A>, DomainError> {
    let Some(last) = history.last() else {
        return Ok(None);
    };

    let mut aggregate = A::default();
    for stored in history {
        let event: A::Event = serde_json::from_value(stored.payload.clone())?;
        aggregate.apply(event);
    }
    aggregate.set_sequence(last.sequence);
    Ok(Some(aggregate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    enum CounterEvent {
        Opened { id: String },
        Added { value: i64 },
    }

    impl DomainEvent for CounterEvent {
        fn event_type(&self) -> &'static str {
            match self {
                CounterEvent::Opened { .. } => "CounterOpened",
                CounterEvent::Added { .. } => "CounterAdded",
            }
        }
    }

    #[derive(Debug, Default)]
    struct Counter {
        id: Option<WorkflowId>,
        total: i64,
        sequence: Sequence,
    }

    impl Aggregate for Counter {
        type Event = CounterEvent;

        fn aggregate_type() -> &'static str {
            "Counter"
        }

        fn id(&self) -> Option<&WorkflowId> {
            self.id.as_ref()
        }

        fn sequence(&self) -> Sequence {
            self.sequence
        }

        fn set_sequence(&mut self, sequence: Sequence) {
            self.sequence = sequence;
        }

        fn apply(&mut self, event: Self::Event) {
            match event {
                CounterEvent::Opened { id } => self.id = Some(WorkflowId::new(id)),
                CounterEvent::Added { value } => self.total += value,
            }
        }
    }

    fn stored(sequence: i64, event: &CounterEvent) -> HistoryEvent {
        HistoryEvent::builder()
            .workflow_id(WorkflowId::new("counter-1"))
            .workflow_type(Counter::aggregate_type())
            .event_type(event.event_type())
            .sequence(Sequence::new(sequence))
            .payload(event)
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn apply_events_folds_state() {
        let mut counter = Counter::default();
        counter.apply_events(vec![
            CounterEvent::Opened { id: "c".into() },
            CounterEvent::Added { value: 2 },
            CounterEvent::Added { value: 40 },
        ]);
        assert_eq!(counter.total, 42);
        assert_eq!(counter.id().map(WorkflowId::as_str), Some("c"));
    }

    #[test]
    fn replay_decodes_history_and_tracks_sequence() {
        let history = vec![
            stored(1, &CounterEvent::Opened { id: "counter-1".into() }),
            stored(2, &CounterEvent::Added { value: 5 }),
        ];

        let counter: Counter = replay(&history).unwrap().unwrap();
        assert_eq!(counter.total, 5);
        assert_eq!(counter.sequence(), Sequence::new(2));
    }

    #[test]
    fn replay_of_empty_history_is_none() {
        let result: Option<Counter> = replay(&[]).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn replay_rejects_foreign_payload() {
        let bogus = HistoryEvent::builder()
            .workflow_id(WorkflowId::new("counter-1"))
            .workflow_type("Counter")
            .event_type("Unknown")
            .sequence(Sequence::first())
            .payload_raw(serde_json::json!({"nope": 1}))
            .build()
            .unwrap();
        let result: Result<Option<Counter>, _> = replay(&[bogus]);
        assert!(matches!(result, Err(DomainError::Serialization(_))));
    }
}
