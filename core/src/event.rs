//! Event trait and envelope types for the event log.
//!
//! Events are immutable facts. Callers append [`NewEvent`] envelopes; the
//! log assigns ordering and returns [`RecordedEvent`] envelopes on read.
//!
//! # Payload format
//!
//! Payloads are stored as `serde_json::Value` rather than opaque bytes so
//! that the upcasting chain can rewrite old schema shapes structurally at
//! read time without a decode/encode round trip through every consumer
//! type.
//!
//! # Example
//!
//! ```
//! use strata_core::event::DomainEvent;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Clone, Debug, Serialize, Deserialize)]
//! enum OrderEvent {
//!     OrderCreated { order_id: String },
//!     ItemAdded { sku: String, quantity: u32 },
//! }
//!
//! impl DomainEvent for OrderEvent {
//!     fn event_type(&self) -> &'static str {
//!         match self {
//!             OrderEvent::OrderCreated { .. } => "OrderCreated",
//!             OrderEvent::ItemAdded { .. } => "ItemAdded",
//!         }
//!     }
//! }
//! ```

use crate::stream::{GlobalPosition, StreamId, Version};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error types for event encoding and decoding.
#[derive(Error, Debug)]
pub enum EventError {
    /// Failed to serialize an event payload.
    #[error("Failed to serialize event: {0}")]
    Serialization(String),

    /// Failed to deserialize an event payload.
    #[error("Failed to deserialize event: {0}")]
    Deserialization(String),
}

/// A domain event that can be stored in the event log and replayed to
/// reconstruct aggregate state.
///
/// # Naming and versioning
///
/// `event_type()` returns a stable identifier used for storage routing
/// and upcaster lookup. `schema_version()` tags the payload shape;
/// bump it (and register an upcaster) when the shape changes.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Returns the stable event type identifier, e.g. `"OrderCreated"`.
    fn event_type(&self) -> &'static str;

    /// Returns the schema version of this event's payload shape.
    ///
    /// Defaults to 1. Stored alongside the payload and consulted by the
    /// upcasting chain on read.
    fn schema_version(&self) -> u32 {
        1
    }

    /// Serialize this event to a JSON payload.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Serialization`] if the event cannot be
    /// represented as JSON.
    fn to_payload(&self) -> Result<serde_json::Value, EventError> {
        serde_json::to_value(self).map_err(|e| EventError::Serialization(e.to_string()))
    }

    /// Deserialize an event from a JSON payload.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Deserialization`] if the payload does not
    /// match this event type's current schema.
    fn from_payload(payload: serde_json::Value) -> Result<Self, EventError> {
        serde_json::from_value(payload).map_err(|e| EventError::Deserialization(e.to_string()))
    }
}

/// Metadata attached to every appended event.
///
/// `correlation_id` links all events caused by one external request;
/// `causation_id` points at the immediate cause (the command or event
/// that produced this one).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Correlation ID shared by everything triggered by one request.
    pub correlation_id: uuid::Uuid,
    /// ID of the immediate cause of this event.
    pub causation_id: uuid::Uuid,
}

impl EventMetadata {
    /// Create metadata for a new causal chain: a fresh correlation id
    /// that is also its own causation id.
    #[must_use]
    pub fn new() -> Self {
        let id = uuid::Uuid::new_v4();
        Self {
            correlation_id: id,
            causation_id: id,
        }
    }

    /// Create metadata continuing an existing causal chain.
    #[must_use]
    pub const fn caused_by(correlation_id: uuid::Uuid, causation_id: uuid::Uuid) -> Self {
        Self {
            correlation_id,
            causation_id,
        }
    }
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// An event submitted for appending, before the log has assigned ordering.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewEvent {
    /// Stable event type identifier, e.g. `"OrderCreated"`.
    pub event_type: String,
    /// Schema version of the payload shape.
    pub schema_version: u32,
    /// JSON payload.
    pub payload: serde_json::Value,
    /// Correlation/causation metadata.
    pub metadata: EventMetadata,
}

impl NewEvent {
    /// Build a `NewEvent` from a typed domain event.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Serialization`] if the event payload cannot
    /// be serialized.
    pub fn from_domain<E: DomainEvent>(event: &E, metadata: EventMetadata) -> Result<Self, EventError> {
        Ok(Self {
            event_type: event.event_type().to_string(),
            schema_version: event.schema_version(),
            payload: event.to_payload()?,
            metadata,
        })
    }
}

/// An event as recorded in the log, with ordering assigned.
///
/// Immutable once appended: `(stream_id, stream_version)` is unique and
/// `global_position` is unique and strictly increasing across streams.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecordedEvent {
    /// Stream this event belongs to.
    pub stream_id: StreamId,
    /// Type of the aggregate the stream represents, e.g. `"order"`.
    pub stream_type: String,
    /// Stable event type identifier.
    pub event_type: String,
    /// Schema version of the payload shape.
    pub schema_version: u32,
    /// Sequence number within the stream, starting at 0.
    pub stream_version: Version,
    /// Monotonic position across all streams.
    pub global_position: GlobalPosition,
    /// JSON payload.
    pub payload: serde_json::Value,
    /// Correlation/causation metadata.
    pub metadata: EventMetadata,
    /// When the event was appended.
    pub occurred_at: DateTime<Utc>,
}

impl RecordedEvent {
    /// Decode the payload into a typed domain event.
    ///
    /// The payload must already be at the current schema version; run it
    /// through the [`UpcasterRegistry`](crate::upcast::UpcasterRegistry)
    /// first when replaying historical data.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Deserialization`] if the payload does not
    /// match `E`'s current schema.
    pub fn decode<E: DomainEvent>(&self) -> Result<E, EventError> {
        E::from_payload(self.payload.clone())
    }
}

impl fmt::Display for RecordedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{} ({}, position {})",
            self.event_type, self.stream_version, self.stream_id, self.global_position
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
    enum TestEvent {
        Created { id: String, value: i32 },
        Updated { id: String, new_value: i32 },
    }

    impl DomainEvent for TestEvent {
        fn event_type(&self) -> &'static str {
            match self {
                TestEvent::Created { .. } => "TestEvent.Created",
                TestEvent::Updated { .. } => "TestEvent.Updated",
            }
        }
    }

    #[test]
    fn event_type_returns_correct_identifier() {
        let event = TestEvent::Created {
            id: "test-1".to_string(),
            value: 42,
        };
        assert_eq!(event.event_type(), "TestEvent.Created");
        assert_eq!(event.schema_version(), 1);
    }

    #[test]
    #[allow(clippy::expect_used)] // Panics: Test will fail if serialization fails
    fn payload_roundtrip() {
        let event = TestEvent::Updated {
            id: "test-1".to_string(),
            new_value: 100,
        };

        let payload = event.to_payload().expect("serialization should succeed");
        let decoded = TestEvent::from_payload(payload).expect("deserialization should succeed");

        assert_eq!(event, decoded);
    }

    #[test]
    #[allow(clippy::expect_used)] // Panics: Test will fail if serialization fails
    fn new_event_from_domain() {
        let event = TestEvent::Created {
            id: "test-1".to_string(),
            value: 7,
        };
        let metadata = EventMetadata::new();

        let new_event =
            NewEvent::from_domain(&event, metadata).expect("serialization should succeed");

        assert_eq!(new_event.event_type, "TestEvent.Created");
        assert_eq!(new_event.schema_version, 1);
        assert_eq!(new_event.metadata, metadata);
    }

    #[test]
    fn metadata_new_starts_chain() {
        let metadata = EventMetadata::new();
        assert_eq!(metadata.correlation_id, metadata.causation_id);
    }

    #[test]
    fn metadata_caused_by_links_chain() {
        let root = EventMetadata::new();
        let next = EventMetadata::caused_by(root.correlation_id, uuid::Uuid::new_v4());
        assert_eq!(next.correlation_id, root.correlation_id);
        assert_ne!(next.causation_id, root.causation_id);
    }
}
