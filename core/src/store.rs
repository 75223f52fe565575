//! Event store trait: the append-only, globally ordered event log.
//!
//! The event log is the single source of truth. Everything else in the
//! system (snapshots, checkpoints, saga state, read models) is derived
//! state that can be rebuilt from it.
//!
//! # Guarantees
//!
//! - `append` is all-or-nothing: a batch is assigned consecutive stream
//!   versions and strictly increasing global positions, or nothing is
//!   written.
//! - `append` for one stream is linearizable with respect to itself;
//!   appends to different streams proceed fully in parallel.
//! - Readers never observe a partially written batch.
//!
//! # Dyn Compatibility
//!
//! The trait uses explicit `Pin<Box<dyn Future>>` returns instead of
//! `async fn` so it can be used as a trait object (`Arc<dyn EventStore>`)
//! and shared across the aggregate repository, projection manager, and
//! saga orchestrator.
//!
//! # Example
//!
//! ```no_run
//! use strata_core::store::{EventStore, EventStoreError};
//! use strata_core::stream::{ExpectedVersion, GlobalPosition, StreamId, Version};
//!
//! async fn example<S: EventStore>(store: &S) -> Result<(), EventStoreError> {
//!     let stream_id = StreamId::new("order-1");
//!
//!     // First append: the stream must not exist yet.
//!     let events = vec![/* ... */];
//!     let v = store
//!         .append(stream_id.clone(), "order".to_string(), ExpectedVersion::NoStream, events)
//!         .await?;
//!
//!     // Replay the stream.
//!     let history = store.read_stream(stream_id, Version::INITIAL).await?;
//!
//!     // Tail the global log from the beginning.
//!     let page = store.read_all(GlobalPosition::START, 100).await?;
//!     Ok(())
//! }
//! ```

use crate::event::{NewEvent, RecordedEvent};
use crate::stream::{ExpectedVersion, GlobalPosition, StreamId, Version};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event store operations.
#[derive(Error, Debug)]
pub enum EventStoreError {
    /// Optimistic concurrency conflict: the stream's current version did
    /// not match the caller's expected version.
    ///
    /// Retryable by the caller: reload the aggregate, reapply the
    /// command, and append again. The store itself never retries.
    #[error("Concurrency conflict on stream {stream_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The stream where the conflict occurred.
        stream_id: StreamId,
        /// The version the caller expected.
        expected: ExpectedVersion,
        /// The stream's actual current version.
        actual: ExpectedVersion,
    },

    /// An append was submitted with no events.
    ///
    /// Rejected so that `append` can always return a meaningful new
    /// version and global positions stay dense.
    #[error("Empty append to stream {0}")]
    EmptyAppend(StreamId),

    /// Underlying storage failure. Reported to the caller, never
    /// silently retried by the log.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Append-only event log partitioned into named streams.
///
/// Implementations must be `Send + Sync`; see the module docs for the
/// ordering and atomicity guarantees they must uphold.
pub trait EventStore: Send + Sync {
    /// Append a batch of events to a stream under optimistic concurrency
    /// control.
    ///
    /// On success every event in the batch is assigned a consecutive
    /// `stream_version` (continuing from `expected`) and a strictly
    /// increasing `global_position`, as a single atomic unit. Returns
    /// the stream's new current version (the version of the last event
    /// in the batch).
    ///
    /// `stream_type` names the aggregate type the stream represents and
    /// is recorded on every event; it is fixed by the first append.
    ///
    /// # Errors
    ///
    /// - [`EventStoreError::ConcurrencyConflict`] if the stream's current
    ///   version does not match `expected` ([`ExpectedVersion::NoStream`]
    ///   means the stream must not exist yet)
    /// - [`EventStoreError::EmptyAppend`] if `events` is empty
    /// - [`EventStoreError::Storage`] on storage failure
    fn append(
        &self,
        stream_id: StreamId,
        stream_type: String,
        expected: ExpectedVersion,
        events: Vec<NewEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<Version, EventStoreError>> + Send + '_>>;

    /// Read a stream's events in version order, starting at
    /// `from_version` (inclusive).
    ///
    /// Returns a finite, replayable sequence; a missing stream reads as
    /// empty. Never returns a partially written batch.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::Storage`] on storage failure.
    fn read_stream(
        &self,
        stream_id: StreamId,
        from_version: Version,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RecordedEvent>, EventStoreError>> + Send + '_>>;

    /// Read a page of the global log in `global_position` order.
    ///
    /// Returns up to `limit` events with positions strictly greater than
    /// `from` (exclusive lower bound), so a consumer resumes by passing
    /// the last position it has processed. An empty page means the
    /// consumer has caught up; poll again later to tail the log.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::Storage`] on storage failure.
    fn read_all(
        &self,
        from: GlobalPosition,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RecordedEvent>, EventStoreError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrency_conflict_error_display() {
        let error = EventStoreError::ConcurrencyConflict {
            stream_id: StreamId::new("order-1"),
            expected: ExpectedVersion::Exact(Version::new(5)),
            actual: ExpectedVersion::Exact(Version::new(7)),
        };

        let display = format!("{error}");
        assert!(display.contains("expected version 5"));
        assert!(display.contains("found 7"));
    }

    #[test]
    fn conflict_against_missing_stream_display() {
        let error = EventStoreError::ConcurrencyConflict {
            stream_id: StreamId::new("order-1"),
            expected: ExpectedVersion::Exact(Version::new(0)),
            actual: ExpectedVersion::NoStream,
        };

        let display = format!("{error}");
        assert!(display.contains("found no stream"));
    }

    #[test]
    fn empty_append_error_display() {
        let error = EventStoreError::EmptyAppend(StreamId::new("order-1"));
        assert!(format!("{error}").contains("order-1"));
    }
}
