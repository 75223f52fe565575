//! # Strata Core
//!
//! Core traits and types for Strata, an event-sourced aggregate store
//! with CQRS projections and saga orchestration.
//!
//! This crate defines the abstractions; storage backends and runtimes
//! live in sibling crates (`strata-memory`, `strata-projections`,
//! `strata-sagas`).
//!
//! ## Core Concepts
//!
//! - **Event Store**: append-only log partitioned into streams, with
//!   optimistic concurrency and a global total order
//! - **Aggregate**: domain state reconstituted by folding its stream,
//!   mutated only by handling commands that produce new events
//! - **Snapshot**: cached aggregate state that shortens replay, never
//!   authoritative
//! - **Upcaster**: read-time migration of old event schemas to the
//!   current version
//! - **Projection**: fold of the global log into a denormalized read
//!   model, resumable via checkpoints
//! - **Saga**: multi-step process with compensations, persisted so it
//!   survives restarts
//!
//! ## Architecture Principles
//!
//! - The event log is the single source of truth; everything else is
//!   derived and rebuildable
//! - Writes are validated by pure command handlers, then appended
//!   atomically
//! - Reads are served by projections that tolerate at-least-once
//!   delivery
//!
//! ## Example
//!
//! ```ignore
//! use strata_core::prelude::*;
//!
//! #[derive(Clone, Debug, Default, Serialize, Deserialize)]
//! struct Order {
//!     placed: bool,
//! }
//!
//! impl Aggregate for Order {
//!     type Command = OrderCommand;
//!     type Event = OrderEvent;
//!
//!     fn aggregate_type() -> &'static str {
//!         "order"
//!     }
//!
//!     fn apply(&mut self, event: &OrderEvent) { /* fold */ }
//!
//!     fn handle(&self, command: OrderCommand) -> Result<Vec<OrderEvent>, DomainError> {
//!         /* validate, emit */
//!         Ok(vec![])
//!     }
//! }
//!
//! let repository = AggregateRepository::<Order>::new(store, snapshots)
//!     .with_snapshot_every(100);
//! let version = repository.execute(&stream_id, command, EventMetadata::new()).await?;
//! ```

// Re-export commonly used third-party types.
pub use chrono::{DateTime, Utc};
pub use uuid::Uuid;

pub mod aggregate;
pub mod clock;
pub mod event;
pub mod projection;
pub mod saga;
pub mod snapshot;
pub mod store;
pub mod stream;
pub mod upcast;

pub use aggregate::{Aggregate, AggregateError, AggregateRepository, DomainError};
pub use clock::{Clock, SystemClock};
pub use event::{DomainEvent, EventError, EventMetadata, NewEvent, RecordedEvent};
pub use projection::{CheckpointStore, Projection, ProjectionError, ReadModelStore};
pub use saga::{
    CompletedStep, SagaId, SagaInstance, SagaJournalEntry, SagaStatus, SagaStore, SagaStoreError,
};
pub use snapshot::{Snapshot, SnapshotError, SnapshotStore};
pub use store::{EventStore, EventStoreError};
pub use stream::{ExpectedVersion, GlobalPosition, ParseStreamIdError, StreamId, Version};
pub use upcast::{FnUpcaster, UpcastError, Upcasted, Upcaster, UpcasterRegistry};

/// Convenience re-exports for downstream crates.
pub mod prelude {
    pub use crate::aggregate::{Aggregate, AggregateError, AggregateRepository, DomainError};
    pub use crate::event::{DomainEvent, EventMetadata, NewEvent, RecordedEvent};
    pub use crate::projection::{CheckpointStore, Projection, ProjectionError, ReadModelStore};
    pub use crate::snapshot::{Snapshot, SnapshotStore};
    pub use crate::store::{EventStore, EventStoreError};
    pub use crate::stream::{ExpectedVersion, GlobalPosition, StreamId, Version};
    pub use crate::upcast::{UpcastError, Upcaster, UpcasterRegistry};
}
