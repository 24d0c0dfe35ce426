//! Append-only workflow history.
//!
//! Every durable workflow owns an ordered log of events. The saga engine
//! appends step results here before acting on them and rebuilds a
//! workflow's position by replaying the log after a restart.

pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod store;

pub use common::WorkflowId;
pub use error::{HistoryError, Result};
pub use event::{EventId, HistoryEvent, HistoryEventBuilder, Sequence};
pub use memory::InMemoryHistoryStore;
pub use postgres::PostgresHistoryStore;
pub use store::{AppendOptions, HistoryStore, HistoryStoreExt, HistoryStream};
