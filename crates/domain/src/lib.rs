//! Domain layer for the transfer saga.
//!
//! This crate provides:
//! - the immutable [`TransferRequest`] and its validation rules
//! - the [`Aggregate`] / [`DomainEvent`] traits used to rebuild state from
//!   a workflow history

pub mod aggregate;
pub mod error;
pub mod transfer;

pub use aggregate::{Aggregate, DomainEvent, replay};
pub use error::{DomainError, ValidationError};
pub use transfer::TransferRequest;
