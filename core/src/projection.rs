//! Projection traits: the query side of CQRS.
//!
//! A [`Projection`] folds recorded events into a denormalized read
//! model. Its progress through the global log is tracked by a
//! [`CheckpointStore`], which makes consumption resumable: after a
//! restart the projection continues from the last checkpointed
//! position instead of the beginning.
//!
//! # Delivery semantics
//!
//! Checkpoints are saved *after* a handler succeeds, so a crash between
//! the two can redeliver the last event. Handlers therefore see
//! at-least-once delivery and should be idempotent (keyed upserts
//! rather than blind inserts).
//!
//! # Example
//!
//! ```ignore
//! struct OrderTotals {
//!     read_models: Arc<InMemoryReadModelStore>,
//! }
//!
//! impl Projection for OrderTotals {
//!     fn name(&self) -> &str {
//!         "order_totals"
//!     }
//!
//!     async fn apply(&self, event: &RecordedEvent) -> Result<(), ProjectionError> {
//!         if event.event_type == "OrderPlaced" {
//!             let placed: OrderPlaced = event.decode()?;
//!             self.read_models
//!                 .upsert(&placed.order_id, &serde_json::to_value(&placed.total)?)
//!                 .await?;
//!         }
//!         Ok(())
//!     }
//! }
//! ```

use crate::event::RecordedEvent;
use crate::stream::GlobalPosition;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors from projection processing and its supporting stores.
#[derive(Error, Debug)]
pub enum ProjectionError {
    /// A projection handler failed to apply an event.
    ///
    /// The event is not checkpointed; the manager retries it with
    /// backoff and other projections are unaffected.
    #[error("Projection handler error: {0}")]
    Handler(String),

    /// Checkpoint load/save failure.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Read model or other storage failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ProjectionError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<crate::event::EventError> for ProjectionError {
    fn from(error: crate::event::EventError) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<crate::store::EventStoreError> for ProjectionError {
    fn from(error: crate::store::EventStoreError) -> Self {
        Self::Storage(error.to_string())
    }
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;

/// Folds recorded events into a read model.
///
/// Implementations subscribe to the whole global log and ignore event
/// types they don't care about. `apply` must be idempotent under
/// redelivery of the last processed event.
pub trait Projection: Send + Sync {
    /// Unique name, used as the checkpoint key.
    fn name(&self) -> &str;

    /// Apply one recorded event to the read model.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] if the event could not be applied;
    /// the manager will retry it and will not advance the checkpoint.
    fn apply(&self, event: &RecordedEvent) -> impl Future<Output = Result<()>> + Send;

    /// Clear the read model ahead of a rebuild. Default: no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if the read model could not
    /// be cleared.
    fn reset(&self) -> impl Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }
}

/// Durable record of each projection's position in the global log.
///
/// Dyn-compatible so one store can serve many projections as
/// `Arc<dyn CheckpointStore>`.
pub trait CheckpointStore: Send + Sync {
    /// Load a projection's checkpoint. `None` means it has never
    /// processed an event and starts from [`GlobalPosition::START`].
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Checkpoint`] on storage failure.
    fn load(
        &self,
        projection_name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<GlobalPosition>>> + Send + '_>>;

    /// Record that the projection has processed every event up to and
    /// including `position`.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Checkpoint`] on storage failure.
    fn save(
        &self,
        projection_name: &str,
        position: GlobalPosition,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Remove the checkpoint so the projection replays from the start.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Checkpoint`] on storage failure.
    fn reset(
        &self,
        projection_name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Keyed document store for projection read models.
///
/// A thin upsert/get/delete surface; projections that need richer
/// queries bring their own storage.
pub trait ReadModelStore: Send + Sync {
    /// Insert or replace the document at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] on storage failure.
    fn upsert(
        &self,
        key: &str,
        value: &serde_json::Value,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Fetch the document at `key`, if present.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] on storage failure.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<serde_json::Value>>> + Send;

    /// Delete the document at `key`. Deleting a missing key is not an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] on storage failure.
    fn delete(&self, key: &str) -> impl Future<Output = Result<()>> + Send;

    /// Remove every document. Used by projection rebuilds.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] on storage failure.
    fn clear(&self) -> impl Future<Output = Result<()>> + Send;
}
