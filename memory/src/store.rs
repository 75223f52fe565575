//! In-memory event store.
//!
//! A single `RwLock` guards both the global log and the per-stream
//! index, so an append is atomic: version check, version assignment,
//! and position assignment happen under one write lock. Appends to the
//! same stream are linearizable; readers never see a partial batch.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use strata_core::clock::{Clock, SystemClock};
use strata_core::event::{NewEvent, RecordedEvent};
use strata_core::store::{EventStore, EventStoreError};
use strata_core::stream::{ExpectedVersion, GlobalPosition, StreamId, Version};

/// Per-stream bookkeeping: indices into the global log, plus the
/// stream type fixed by the first append.
#[derive(Debug)]
struct StreamEntry {
    indices: Vec<usize>,
    stream_type: String,
}

#[derive(Debug, Default)]
struct LogInner {
    log: Vec<RecordedEvent>,
    streams: HashMap<StreamId, StreamEntry>,
}

/// Event store backed by process memory.
///
/// Cloning is cheap and shares the log. Global positions start at 1
/// and are dense (no gaps), which tests rely on.
///
/// # Example
///
/// ```ignore
/// let store = InMemoryEventStore::new();
/// let version = store
///     .append(stream_id, "order".to_string(), ExpectedVersion::NoStream, events)
///     .await?;
/// ```
#[derive(Clone)]
pub struct InMemoryEventStore {
    inner: Arc<RwLock<LogInner>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for InMemoryEventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEventStore")
            .field("events", &self.len().unwrap_or(0))
            .finish_non_exhaustive()
    }
}

impl InMemoryEventStore {
    /// Create an empty store using the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store with an injected clock, for deterministic
    /// `occurred_at` timestamps in tests.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(LogInner::default())),
            clock,
        }
    }

    /// Total number of events in the global log.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::Storage`] if the log lock is poisoned.
    pub fn len(&self) -> Result<usize, EventStoreError> {
        Ok(self.read_inner()?.log.len())
    }

    /// Whether the log holds no events.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::Storage`] if the log lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, EventStoreError> {
        Ok(self.read_inner()?.log.is_empty())
    }

    fn read_inner(&self) -> Result<std::sync::RwLockReadGuard<'_, LogInner>, EventStoreError> {
        self.inner
            .read()
            .map_err(|_| EventStoreError::Storage("event log lock poisoned".to_string()))
    }

    fn write_inner(&self) -> Result<std::sync::RwLockWriteGuard<'_, LogInner>, EventStoreError> {
        self.inner
            .write()
            .map_err(|_| EventStoreError::Storage("event log lock poisoned".to_string()))
    }

    fn do_append(
        &self,
        stream_id: StreamId,
        stream_type: String,
        expected: ExpectedVersion,
        events: Vec<NewEvent>,
    ) -> Result<Version, EventStoreError> {
        if events.is_empty() {
            return Err(EventStoreError::EmptyAppend(stream_id));
        }

        let mut inner = self.write_inner()?;

        let actual = inner
            .streams
            .get(&stream_id)
            .and_then(|entry| entry.indices.last())
            .map(|&index| inner.log[index].stream_version);
        let actual = ExpectedVersion::from(actual);
        if actual != expected {
            return Err(EventStoreError::ConcurrencyConflict {
                stream_id,
                expected,
                actual,
            });
        }

        let stream_type = inner
            .streams
            .get(&stream_id)
            .map_or(stream_type, |entry| entry.stream_type.clone());

        let mut version = expected.version().map_or(Version::INITIAL, Version::next);
        let occurred_at = self.clock.now();
        let count = events.len();

        for event in events {
            let global_position = GlobalPosition::new(inner.log.len() as u64 + 1);
            let index = inner.log.len();
            inner.log.push(RecordedEvent {
                stream_id: stream_id.clone(),
                stream_type: stream_type.clone(),
                event_type: event.event_type,
                schema_version: event.schema_version,
                stream_version: version,
                global_position,
                payload: event.payload,
                metadata: event.metadata,
                occurred_at,
            });
            inner
                .streams
                .entry(stream_id.clone())
                .or_insert_with(|| StreamEntry {
                    indices: Vec::new(),
                    stream_type: stream_type.clone(),
                })
                .indices
                .push(index);
            version = version.next();
        }

        // `version` has advanced one past the last event written.
        let new_version = Version::new(version.value() - 1);
        tracing::debug!(
            stream_id = %stream_id,
            events = count,
            new_version = %new_version,
            "Appended events"
        );
        Ok(new_version)
    }

    fn do_read_stream(
        &self,
        stream_id: &StreamId,
        from_version: Version,
    ) -> Result<Vec<RecordedEvent>, EventStoreError> {
        let inner = self.read_inner()?;
        let Some(entry) = inner.streams.get(stream_id) else {
            return Ok(Vec::new());
        };
        Ok(entry
            .indices
            .iter()
            .map(|&index| &inner.log[index])
            .filter(|event| event.stream_version >= from_version)
            .cloned()
            .collect())
    }

    fn do_read_all(
        &self,
        from: GlobalPosition,
        limit: usize,
    ) -> Result<Vec<RecordedEvent>, EventStoreError> {
        let inner = self.read_inner()?;
        // Positions are dense and 1-based, so position p lives at index p-1.
        let start = usize::try_from(from.value())
            .map_err(|_| EventStoreError::Storage("position out of range".to_string()))?;
        Ok(inner.log.iter().skip(start).take(limit).cloned().collect())
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        stream_id: StreamId,
        stream_type: String,
        expected: ExpectedVersion,
        events: Vec<NewEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<Version, EventStoreError>> + Send + '_>> {
        Box::pin(async move { self.do_append(stream_id, stream_type, expected, events) })
    }

    fn read_stream(
        &self,
        stream_id: StreamId,
        from_version: Version,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RecordedEvent>, EventStoreError>> + Send + '_>>
    {
        Box::pin(async move { self.do_read_stream(&stream_id, from_version) })
    }

    fn read_all(
        &self,
        from: GlobalPosition,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RecordedEvent>, EventStoreError>> + Send + '_>>
    {
        Box::pin(async move { self.do_read_all(from, limit) })
    }
}
