//! # Strata Testing
//!
//! Testing utilities and helpers for Strata.
//!
//! This crate provides:
//! - Deterministic clocks
//! - Builders for fabricating recorded events without a store
//! - Scripted saga activities with recorded invocation counts
//!
//! ## Example
//!
//! ```ignore
//! use strata_testing::{test_clock, RecordedEventBuilder, ScriptedActivity};
//!
//! #[tokio::test]
//! async fn projection_handles_order_placed() {
//!     let event = RecordedEventBuilder::new("order-1", "OrderPlaced")
//!         .payload(serde_json::json!({"total": 42}))
//!         .build();
//!
//!     projection.apply(&event).await.unwrap();
//! }
//! ```

/// Deterministic clocks for reproducible tests.
pub mod mocks {
    use chrono::{DateTime, Utc};
    use strata_core::clock::Clock;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use strata_testing::mocks::FixedClock;
    /// use strata_core::clock::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Builders for fabricating recorded events.
pub mod events {
    use chrono::{DateTime, Utc};
    use strata_core::event::{EventMetadata, RecordedEvent};
    use strata_core::stream::{GlobalPosition, StreamId, Version};

    /// Builds a [`RecordedEvent`] directly, bypassing the event store.
    ///
    /// Useful for unit-testing projections and upcasters against
    /// hand-crafted events. Defaults: stream type `"test"`, schema
    /// version 1, version 0, global position 1, empty object payload.
    #[derive(Debug, Clone)]
    pub struct RecordedEventBuilder {
        stream_id: StreamId,
        stream_type: String,
        event_type: String,
        schema_version: u32,
        stream_version: Version,
        global_position: GlobalPosition,
        payload: serde_json::Value,
        metadata: EventMetadata,
        occurred_at: DateTime<Utc>,
    }

    impl RecordedEventBuilder {
        /// Start a builder for an event on `stream_id` of `event_type`.
        #[must_use]
        pub fn new(stream_id: impl Into<String>, event_type: impl Into<String>) -> Self {
            Self {
                stream_id: StreamId::new(stream_id),
                stream_type: "test".to_string(),
                event_type: event_type.into(),
                schema_version: 1,
                stream_version: Version::INITIAL,
                global_position: GlobalPosition::new(1),
                payload: serde_json::json!({}),
                metadata: EventMetadata::new(),
                occurred_at: Utc::now(),
            }
        }

        /// Set the stream type.
        #[must_use]
        pub fn stream_type(mut self, stream_type: impl Into<String>) -> Self {
            self.stream_type = stream_type.into();
            self
        }

        /// Set the payload schema version.
        #[must_use]
        pub const fn schema_version(mut self, schema_version: u32) -> Self {
            self.schema_version = schema_version;
            self
        }

        /// Set the stream version.
        #[must_use]
        pub const fn stream_version(mut self, version: u64) -> Self {
            self.stream_version = Version::new(version);
            self
        }

        /// Set the global position.
        #[must_use]
        pub const fn global_position(mut self, position: u64) -> Self {
            self.global_position = GlobalPosition::new(position);
            self
        }

        /// Set the JSON payload.
        #[must_use]
        pub fn payload(mut self, payload: serde_json::Value) -> Self {
            self.payload = payload;
            self
        }

        /// Set the metadata.
        #[must_use]
        pub const fn metadata(mut self, metadata: EventMetadata) -> Self {
            self.metadata = metadata;
            self
        }

        /// Set the occurrence timestamp.
        #[must_use]
        pub const fn occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
            self.occurred_at = occurred_at;
            self
        }

        /// Build the event.
        #[must_use]
        pub fn build(self) -> RecordedEvent {
            RecordedEvent {
                stream_id: self.stream_id,
                stream_type: self.stream_type,
                event_type: self.event_type,
                schema_version: self.schema_version,
                stream_version: self.stream_version,
                global_position: self.global_position,
                payload: self.payload,
                metadata: self.metadata,
                occurred_at: self.occurred_at,
            }
        }
    }
}

/// Fluent harness for projection tests.
pub mod harness {
    use strata_core::event::RecordedEvent;
    use strata_core::projection::{Projection, Result};

    /// Test harness for projections providing a fluent testing API.
    ///
    /// Applies fabricated events straight to the projection, bypassing
    /// the event store and manager, so handler logic can be tested in
    /// isolation.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let mut harness = ProjectionTestHarness::new(projection);
    ///
    /// harness
    ///     .given_events(vec![placed, cancelled])
    ///     .await?;
    /// assert_eq!(read_models.get("order-1").await?, None);
    /// ```
    pub struct ProjectionTestHarness<P: Projection> {
        projection: P,
        applied: usize,
    }

    impl<P: Projection> ProjectionTestHarness<P> {
        /// Create a harness around the given projection.
        ///
        /// Keep a handle to the projection's read model store yourself
        /// for assertions; the harness only drives the handler.
        #[must_use]
        pub const fn new(projection: P) -> Self {
            Self {
                projection,
                applied: 0,
            }
        }

        /// Apply a series of events to the projection, in order.
        ///
        /// # Errors
        ///
        /// Returns the first [`ProjectionError`](strata_core::projection::ProjectionError)
        /// from a handler.
        pub async fn given_events(&mut self, events: Vec<RecordedEvent>) -> Result<&mut Self> {
            for event in events {
                self.given_event(event).await?;
            }
            Ok(self)
        }

        /// Apply a single event to the projection.
        ///
        /// # Errors
        ///
        /// Returns the handler's [`ProjectionError`](strata_core::projection::ProjectionError).
        pub async fn given_event(&mut self, event: RecordedEvent) -> Result<&mut Self> {
            self.projection.apply(&event).await?;
            self.applied += 1;
            Ok(self)
        }

        /// How many events have been applied so far.
        #[must_use]
        pub const fn applied(&self) -> usize {
            self.applied
        }

        /// The projection under test, for custom queries.
        #[must_use]
        pub const fn projection(&self) -> &P {
            &self.projection
        }
    }
}

/// Scripted saga activities for orchestrator tests.
pub mod activities {
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicU32, Ordering};
    use strata_sagas::activity::{Activity, ActivityContext, ActivityError, StepOutput};

    enum Script {
        /// Succeed on every attempt.
        Succeed,
        /// Fail transiently this many times, then succeed.
        FailTimes(u32),
        /// Fail transiently on every attempt.
        AlwaysFail,
        /// Fail permanently on every attempt.
        FailPermanently,
        /// Never return; the attempt only ends via timeout.
        Hang,
    }

    /// Activity whose behavior is scripted up front and whose
    /// invocations are counted.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let charge = Arc::new(ScriptedActivity::fails_then_succeeds(2, json!({"ok": true})));
    /// // ... run the saga ...
    /// assert_eq!(charge.executions(), 3);
    /// ```
    pub struct ScriptedActivity {
        script: Script,
        result: serde_json::Value,
        compensation_fails: bool,
        executions: AtomicU32,
        compensations: AtomicU32,
    }

    impl ScriptedActivity {
        /// Succeeds on every attempt with the given result.
        #[must_use]
        pub const fn succeeds(result: serde_json::Value) -> Self {
            Self::scripted(Script::Succeed, result)
        }

        /// Fails transiently `times` times, then succeeds.
        #[must_use]
        pub const fn fails_then_succeeds(times: u32, result: serde_json::Value) -> Self {
            Self::scripted(Script::FailTimes(times), result)
        }

        /// Fails transiently on every attempt.
        #[must_use]
        pub const fn always_fails() -> Self {
            Self::scripted(Script::AlwaysFail, serde_json::Value::Null)
        }

        /// Fails permanently on the first attempt.
        #[must_use]
        pub const fn fails_permanently() -> Self {
            Self::scripted(Script::FailPermanently, serde_json::Value::Null)
        }

        /// Never returns; only a step timeout ends the attempt.
        #[must_use]
        pub const fn hangs() -> Self {
            Self::scripted(Script::Hang, serde_json::Value::Null)
        }

        /// Make this activity's compensation fail as well.
        #[must_use]
        pub const fn with_failing_compensation(mut self) -> Self {
            self.compensation_fails = true;
            self
        }

        /// How many times `execute` was called.
        #[must_use]
        pub fn executions(&self) -> u32 {
            self.executions.load(Ordering::SeqCst)
        }

        /// How many times `compensate` was called.
        #[must_use]
        pub fn compensations(&self) -> u32 {
            self.compensations.load(Ordering::SeqCst)
        }

        const fn scripted(script: Script, result: serde_json::Value) -> Self {
            Self {
                script,
                result,
                compensation_fails: false,
                executions: AtomicU32::new(0),
                compensations: AtomicU32::new(0),
            }
        }
    }

    impl Activity for ScriptedActivity {
        fn execute<'a>(
            &'a self,
            _context: &'a ActivityContext,
        ) -> Pin<Box<dyn Future<Output = Result<StepOutput, ActivityError>> + Send + 'a>> {
            let attempt = self.executions.fetch_add(1, Ordering::SeqCst) + 1;
            Box::pin(async move {
                match self.script {
                    Script::Succeed => Ok(StepOutput::new(self.result.clone())),
                    Script::FailTimes(times) if attempt <= times => Err(
                        ActivityError::Transient(format!("scripted failure {attempt}")),
                    ),
                    Script::FailTimes(_) => Ok(StepOutput::new(self.result.clone())),
                    Script::AlwaysFail => Err(ActivityError::Transient(format!(
                        "scripted failure {attempt}"
                    ))),
                    Script::FailPermanently => Err(ActivityError::Permanent(
                        "scripted permanent failure".to_string(),
                    )),
                    Script::Hang => {
                        std::future::pending::<()>().await;
                        unreachable!("pending future never resolves")
                    }
                }
            })
        }

        fn compensate<'a>(
            &'a self,
            _context: &'a ActivityContext,
            _compensation_input: &'a serde_json::Value,
        ) -> Pin<Box<dyn Future<Output = Result<(), ActivityError>> + Send + 'a>> {
            self.compensations.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                if self.compensation_fails {
                    Err(ActivityError::Permanent(
                        "scripted compensation failure".to_string(),
                    ))
                } else {
                    Ok(())
                }
            })
        }
    }

    impl std::fmt::Debug for ScriptedActivity {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("ScriptedActivity")
                .field("executions", &self.executions())
                .field("compensations", &self.compensations())
                .finish_non_exhaustive()
        }
    }
}

// Re-export commonly used items
pub use activities::ScriptedActivity;
pub use events::RecordedEventBuilder;
pub use harness::ProjectionTestHarness;
pub use mocks::{FixedClock, test_clock};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_is_deterministic() {
        use strata_core::clock::Clock;

        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn builder_fills_defaults() {
        let event = RecordedEventBuilder::new("order-1", "OrderPlaced").build();
        assert_eq!(event.stream_id.as_str(), "order-1");
        assert_eq!(event.event_type, "OrderPlaced");
        assert_eq!(event.schema_version, 1);
        assert_eq!(event.global_position.value(), 1);
    }
}
