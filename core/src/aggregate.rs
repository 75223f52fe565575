//! Aggregate abstraction and the repository that replays and persists it.
//!
//! An [`Aggregate`] is pure domain logic: `handle` validates a command
//! against current state and produces events (or a [`DomainError`],
//! never a partial application); `apply` folds an event into state.
//! The [`AggregateRepository`] does the I/O around it: load a snapshot,
//! replay the remaining events through the upcasting chain, append new
//! events under optimistic concurrency, and take best-effort snapshots.
//!
//! # Retry is a caller concern
//!
//! `save` and `execute` surface [`EventStoreError::ConcurrencyConflict`]
//! unchanged. The repository never retries implicitly; the caller
//! reloads, reapplies the command, and tries again under its own policy.
//!
//! # Example
//!
//! ```
//! use strata_core::aggregate::{Aggregate, DomainError};
//! use strata_core::event::DomainEvent;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Clone, Debug, Default, Serialize, Deserialize)]
//! struct Counter {
//!     count: i64,
//! }
//!
//! #[derive(Clone, Debug, Serialize, Deserialize)]
//! enum CounterEvent {
//!     Incremented { by: i64 },
//! }
//!
//! impl DomainEvent for CounterEvent {
//!     fn event_type(&self) -> &'static str {
//!         "Incremented"
//!     }
//! }
//!
//! enum CounterCommand {
//!     Increment { by: i64 },
//! }
//!
//! impl Aggregate for Counter {
//!     type Command = CounterCommand;
//!     type Event = CounterEvent;
//!
//!     fn aggregate_type() -> &'static str {
//!         "counter"
//!     }
//!
//!     fn apply(&mut self, event: &CounterEvent) {
//!         match event {
//!             CounterEvent::Incremented { by } => self.count += by,
//!         }
//!     }
//!
//!     fn handle(&self, command: CounterCommand) -> Result<Vec<CounterEvent>, DomainError> {
//!         match command {
//!             CounterCommand::Increment { by } if by > 0 => {
//!                 Ok(vec![CounterEvent::Incremented { by }])
//!             }
//!             CounterCommand::Increment { .. } => {
//!                 Err(DomainError::Validation("increment must be positive".into()))
//!             }
//!         }
//!     }
//! }
//! ```

use crate::clock::{Clock, SystemClock};
use crate::event::{EventError, EventMetadata, NewEvent};
use crate::snapshot::{Snapshot, SnapshotStore};
use crate::store::{EventStore, EventStoreError};
use crate::stream::{ExpectedVersion, StreamId, Version};
use crate::upcast::{UpcastError, UpcasterRegistry};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;
use thiserror::Error;

/// A domain rule was violated.
///
/// Not retryable; surfaced to the command caller unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The command's data failed validation.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The command is not applicable in the aggregate's current state.
    #[error("Command not applicable: {0}")]
    NotApplicable(String),
}

/// Errors from loading or saving an aggregate.
#[derive(Error, Debug)]
pub enum AggregateError {
    /// Domain rule violation from `handle`.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Event store failure, including concurrency conflicts.
    #[error(transparent)]
    Store(#[from] EventStoreError),

    /// Upcasting failure during replay. Fatal for this load.
    #[error(transparent)]
    Upcast(#[from] UpcastError),

    /// Event payload could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] EventError),
}

impl AggregateError {
    /// Whether the caller should reload and retry (optimistic
    /// concurrency conflict).
    #[must_use]
    pub const fn is_concurrency_conflict(&self) -> bool {
        matches!(
            self,
            Self::Store(EventStoreError::ConcurrencyConflict { .. })
        )
    }
}

/// An aggregate root: state reconstituted by folding its event stream.
///
/// `Default` is the empty state of a stream with no events. State must
/// be serde-serializable so it can be snapshotted.
pub trait Aggregate: Default + Serialize + DeserializeOwned + Send + Sync {
    /// Commands this aggregate accepts.
    type Command;

    /// Events this aggregate produces and consumes.
    type Event: crate::event::DomainEvent;

    /// Type name recorded as the `stream_type` of this aggregate's
    /// streams, e.g. `"order"`.
    fn aggregate_type() -> &'static str;

    /// Fold an event into state. Infallible: events are facts that have
    /// already been validated and appended.
    fn apply(&mut self, event: &Self::Event);

    /// Validate a command against current state and produce the
    /// resulting events.
    ///
    /// Pure: no I/O, no mutation. An inapplicable command fails with a
    /// [`DomainError`] and produces nothing.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError`] when the command violates a domain rule
    /// in the current state.
    fn handle(&self, command: Self::Command) -> Result<Vec<Self::Event>, DomainError>;
}

/// Loads and persists one aggregate type against the event log.
///
/// Construct once per aggregate type at startup and share it; all state
/// lives in the injected stores.
pub struct AggregateRepository<A: Aggregate> {
    store: Arc<dyn EventStore>,
    snapshots: Arc<dyn SnapshotStore>,
    upcasters: Arc<UpcasterRegistry>,
    clock: Arc<dyn Clock>,
    snapshot_every: u64,
    _marker: PhantomData<fn() -> A>,
}

impl<A: Aggregate> AggregateRepository<A> {
    /// Create a repository with no upcasters and snapshotting disabled.
    #[must_use]
    pub fn new(store: Arc<dyn EventStore>, snapshots: Arc<dyn SnapshotStore>) -> Self {
        Self {
            store,
            snapshots,
            upcasters: Arc::new(UpcasterRegistry::new()),
            clock: Arc::new(SystemClock),
            snapshot_every: 0,
            _marker: PhantomData,
        }
    }

    /// Use the given upcaster registry during replay.
    #[must_use]
    pub fn with_upcasters(mut self, upcasters: Arc<UpcasterRegistry>) -> Self {
        self.upcasters = upcasters;
        self
    }

    /// Use the given clock for snapshot timestamps, for deterministic
    /// tests.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Take a snapshot every `every` appended events. `0` disables
    /// snapshotting (the default).
    ///
    /// Snapshotting is best-effort: a failed snapshot write is logged
    /// and the save still succeeds.
    #[must_use]
    pub const fn with_snapshot_every(mut self, every: u64) -> Self {
        self.snapshot_every = every;
        self
    }

    /// Load an aggregate: latest snapshot (if any) plus replay of the
    /// remaining events through the upcasting chain.
    ///
    /// Returns the state and the stream's current version
    /// ([`ExpectedVersion::NoStream`] for a stream with no events), which
    /// is the expected version for a subsequent save.
    ///
    /// A snapshot that fails to load or decode degrades to a full
    /// replay; snapshots are never required for correctness.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::Store`], [`AggregateError::Upcast`], or
    /// [`AggregateError::Codec`] if replay fails.
    pub async fn load(&self, stream_id: &StreamId) -> Result<(A, ExpectedVersion), AggregateError> {
        let mut state = A::default();
        let mut version = ExpectedVersion::NoStream;
        let mut from = Version::INITIAL;

        if let Some(snapshot) = self.load_snapshot(stream_id).await {
            match serde_json::from_value::<A>(snapshot.state) {
                Ok(snapshot_state) => {
                    state = snapshot_state;
                    version = ExpectedVersion::Exact(snapshot.version);
                    from = snapshot.version.next();
                }
                Err(error) => {
                    tracing::warn!(
                        stream_id = %stream_id,
                        snapshot_version = %snapshot.version,
                        %error,
                        "Discarding undecodable snapshot, replaying from the start"
                    );
                }
            }
        }

        let events = self.store.read_stream(stream_id.clone(), from).await?;
        for recorded in events {
            let recorded = self.upcasters.apply(recorded)?;
            let event = recorded.decode::<A::Event>()?;
            state.apply(&event);
            version = ExpectedVersion::Exact(recorded.stream_version);
        }

        Ok((state, version))
    }

    /// Append new events produced by a command.
    ///
    /// `state_after` is the aggregate state with `events` already
    /// applied; it is only used for best-effort snapshotting. Returns
    /// the stream's new version.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::Store`] on append failure — including
    /// [`EventStoreError::ConcurrencyConflict`], which the caller
    /// resolves by reloading and retrying — or [`AggregateError::Codec`]
    /// if an event cannot be serialized.
    pub async fn save(
        &self,
        stream_id: &StreamId,
        expected: ExpectedVersion,
        state_after: &A,
        events: &[A::Event],
        metadata: EventMetadata,
    ) -> Result<Version, AggregateError> {
        let batch = events
            .iter()
            .map(|event| NewEvent::from_domain(event, metadata))
            .collect::<Result<Vec<_>, _>>()?;

        let new_version = self
            .store
            .append(
                stream_id.clone(),
                A::aggregate_type().to_string(),
                expected,
                batch,
            )
            .await?;

        self.maybe_snapshot(stream_id, expected, new_version, state_after)
            .await;

        Ok(new_version)
    }

    /// Load, handle, and save in one call: the command-submission path.
    ///
    /// Returns the stream's version after the command. A command that
    /// produces no events is a no-op and returns the version unchanged
    /// (possibly still [`ExpectedVersion::NoStream`]).
    ///
    /// # Errors
    ///
    /// Surfaces [`DomainError`] and concurrency conflicts synchronously;
    /// the caller owns the retry policy for the latter.
    pub async fn execute(
        &self,
        stream_id: &StreamId,
        command: A::Command,
        metadata: EventMetadata,
    ) -> Result<ExpectedVersion, AggregateError> {
        let (state, version) = self.load(stream_id).await?;
        let events = state.handle(command)?;
        if events.is_empty() {
            return Ok(version);
        }

        let mut state_after = state;
        for event in &events {
            state_after.apply(event);
        }

        let new_version = self
            .save(stream_id, version, &state_after, &events, metadata)
            .await?;
        Ok(ExpectedVersion::Exact(new_version))
    }

    async fn load_snapshot(&self, stream_id: &StreamId) -> Option<Snapshot> {
        match self.snapshots.load(stream_id.clone()).await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                tracing::warn!(
                    stream_id = %stream_id,
                    %error,
                    "Snapshot load failed, replaying from the start"
                );
                None
            }
        }
    }

    /// Snapshot when the append crossed a `snapshot_every` boundary.
    async fn maybe_snapshot(
        &self,
        stream_id: &StreamId,
        before: ExpectedVersion,
        after: Version,
        state_after: &A,
    ) {
        if self.snapshot_every == 0 {
            return;
        }
        let events_before = before.version().map_or(0, |v| v.value() + 1);
        let events_after = after.value() + 1;
        if events_after / self.snapshot_every == events_before / self.snapshot_every {
            return;
        }

        let state = match serde_json::to_value(state_after) {
            Ok(state) => state,
            Err(error) => {
                tracing::warn!(stream_id = %stream_id, %error, "Snapshot serialization failed");
                return;
            }
        };
        let snapshot = Snapshot {
            stream_id: stream_id.clone(),
            version: after,
            state,
            taken_at: self.clock.now(),
        };
        if let Err(error) = self.snapshots.save(snapshot).await {
            tracing::warn!(stream_id = %stream_id, %error, "Snapshot save failed");
        } else {
            tracing::debug!(stream_id = %stream_id, version = %after, "Snapshot taken");
        }
    }
}

impl<A: Aggregate> std::fmt::Debug for AggregateRepository<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregateRepository")
            .field("aggregate_type", &A::aggregate_type())
            .field("snapshot_every", &self.snapshot_every)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_error_display() {
        let err = DomainError::Validation("quantity must be positive".to_string());
        assert_eq!(format!("{err}"), "Validation failed: quantity must be positive");
    }

    #[test]
    fn concurrency_conflict_detection() {
        let err = AggregateError::Store(EventStoreError::ConcurrencyConflict {
            stream_id: StreamId::new("order-1"),
            expected: ExpectedVersion::Exact(Version::new(0)),
            actual: ExpectedVersion::Exact(Version::new(1)),
        });
        assert!(err.is_concurrency_conflict());

        let err = AggregateError::Domain(DomainError::Validation("nope".to_string()));
        assert!(!err.is_concurrency_conflict());
    }
}
