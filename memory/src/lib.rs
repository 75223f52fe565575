//! In-memory storage backends for Strata.
//!
//! This crate implements every storage trait from `strata-core` against
//! process memory: the event log, snapshots, projection checkpoints,
//! read models, and saga instances. The implementations honor the same
//! contracts a durable backend would (atomic appends, optimistic
//! concurrency, dense global positions), which makes them suitable both
//! for tests and for single-process deployments that don't need
//! durability.
//!
//! # Example
//!
//! ```ignore
//! use strata_memory::{InMemoryEventStore, InMemorySnapshotStore};
//! use strata_core::aggregate::AggregateRepository;
//! use std::sync::Arc;
//!
//! let store = Arc::new(InMemoryEventStore::new());
//! let snapshots = Arc::new(InMemorySnapshotStore::new());
//! let repository = AggregateRepository::<Order>::new(store, snapshots);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod checkpoint;
pub mod read_model;
pub mod saga;
pub mod snapshot;
pub mod store;

pub use checkpoint::InMemoryCheckpointStore;
pub use read_model::InMemoryReadModelStore;
pub use saga::InMemorySagaStore;
pub use snapshot::InMemorySnapshotStore;
pub use store::InMemoryEventStore;
