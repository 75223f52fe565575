//! Snapshot store trait: a keyed cache of aggregate state.
//!
//! Snapshots shorten replay. They are never authoritative: replaying a
//! stream from version 0 must always reproduce the same state, and a
//! failed snapshot read or write degrades to a full replay rather than
//! an error.

use crate::stream::{StreamId, Version};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors from snapshot store operations.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// Underlying storage failure.
    #[error("Snapshot storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization failure.
    #[error("Snapshot serialization error: {0}")]
    Serialization(String),
}

/// Aggregate state captured immediately after a known stream version.
///
/// A later snapshot for the same stream supersedes an earlier one.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Snapshot {
    /// Stream the snapshot belongs to.
    pub stream_id: StreamId,
    /// The stream version the state reflects (events 0..=version applied).
    pub version: Version,
    /// Serialized aggregate state.
    pub state: serde_json::Value,
    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,
}

/// Keyed store of the latest snapshot per stream.
///
/// Dyn-compatible (`Pin<Box<dyn Future>>` returns) so it can be shared
/// as `Arc<dyn SnapshotStore>` by the aggregate repository.
pub trait SnapshotStore: Send + Sync {
    /// Save a snapshot, superseding any earlier snapshot for the stream.
    ///
    /// Implementations may ignore a snapshot older than the one already
    /// stored.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Storage`] on storage failure.
    fn save(
        &self,
        snapshot: Snapshot,
    ) -> Pin<Box<dyn Future<Output = Result<(), SnapshotError>> + Send + '_>>;

    /// Load the latest snapshot for a stream, if any.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Storage`] on storage failure.
    fn load(
        &self,
        stream_id: StreamId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Snapshot>, SnapshotError>> + Send + '_>>;
}
