//! Projection runtime for Strata.
//!
//! # Overview
//!
//! This crate runs the query side of CQRS: it drives `Projection`
//! implementations over the global event log with checkpointed
//! resumption. Each projection is managed independently, so a failing
//! handler stalls only its own read model while the rest of the system
//! keeps moving.
//!
//! # Architecture
//!
//! ```text
//! Event Store (global log)
//!        │ read_all pages
//!        ▼
//! ProjectionManager ──▶ Projection ──▶ Read Model
//!        │
//!        └──▶ CheckpointStore (position after each applied event)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use strata_projections::ProjectionManager;
//!
//! let (manager, shutdown) = ProjectionManager::new(projection, store, checkpoints);
//! tokio::spawn(async move { manager.run().await });
//! ```

/// Checkpointed catch-up and tailing over the global log
pub mod manager;

pub use manager::ProjectionManager;
