//! Upcasting chain: read-time schema migration for stored events.
//!
//! Stored events are never mutated. When an event's payload shape
//! changes, the old events stay in the log at their original
//! `schema_version` and an [`Upcaster`] registered for
//! `(event_type, old_version)` rewrites them to the next shape on read.
//! The registry applies transforms repeatedly until no further transform
//! matches, so a v1 event reaches v3 through the v1→v2 and v2→v3
//! upcasters without either knowing about the other.
//!
//! The registry is built once at startup and resolved by key, not by
//! runtime type inspection. Applying the chain to an already-current
//! event is a no-op (no transform matches its version).
//!
//! # Example
//!
//! ```
//! use strata_core::upcast::{FnUpcaster, UpcasterRegistry};
//! use serde_json::json;
//!
//! let mut registry = UpcasterRegistry::new();
//! registry
//!     .register(FnUpcaster::new("OrderCreated", 1, 2, |mut payload| {
//!         // v2 added a `currency` field, defaulted for old events.
//!         payload["OrderCreated"]["currency"] = json!("USD");
//!         Ok(payload)
//!     }))
//!     .unwrap();
//! registry.declare_current("OrderCreated", 2);
//! ```

use crate::event::RecordedEvent;
use std::collections::HashMap;
use thiserror::Error;

/// Errors from the upcasting chain.
///
/// All variants are fatal for the replay that hit them: a broken or
/// missing upcaster must stop the stream's replay rather than silently
/// drop or corrupt data.
#[derive(Error, Debug)]
pub enum UpcastError {
    /// Two upcasters were registered for the same `(event_type, version)`.
    #[error("Duplicate upcaster for {event_type} v{from_version}")]
    Duplicate {
        /// Event type of the colliding registration.
        event_type: String,
        /// Source schema version of the colliding registration.
        from_version: u32,
    },

    /// The chain ended below the declared current schema version.
    #[error("No upcaster from {event_type} v{reached} towards current v{current}")]
    MissingUpcaster {
        /// Event type that could not be fully upcast.
        event_type: String,
        /// The schema version the chain reached.
        reached: u32,
        /// The declared current schema version.
        current: u32,
    },

    /// An upcaster produced a target version at or below its source
    /// version, which would loop forever.
    #[error("Upcaster for {event_type} v{from_version} did not advance the schema (to v{to_version})")]
    NonAdvancing {
        /// Event type of the misbehaving upcaster.
        event_type: String,
        /// Source schema version.
        from_version: u32,
        /// Claimed target version.
        to_version: u32,
    },

    /// An upcaster failed to transform a payload.
    #[error("Upcast of {event_type} v{from_version} failed: {reason}")]
    Transform {
        /// Event type being transformed.
        event_type: String,
        /// Source schema version.
        from_version: u32,
        /// Why the transform failed.
        reason: String,
    },
}

/// Result of one upcasting step.
#[derive(Clone, Debug)]
pub struct Upcasted {
    /// The rewritten payload.
    pub payload: serde_json::Value,
    /// The schema version the payload now has. Must be greater than the
    /// source version.
    pub to_version: u32,
}

/// A single pure transform from one schema version of one event type to
/// a newer one.
pub trait Upcaster: Send + Sync {
    /// Event type this upcaster applies to.
    fn event_type(&self) -> &str;

    /// Schema version this upcaster consumes.
    fn from_version(&self) -> u32;

    /// Rewrite a payload from `from_version` to a newer shape.
    ///
    /// # Errors
    ///
    /// Returns [`UpcastError::Transform`] if the payload cannot be
    /// rewritten.
    fn upcast(&self, payload: serde_json::Value) -> Result<Upcasted, UpcastError>;
}

/// An [`Upcaster`] built from a closure, for the common single-step case.
pub struct FnUpcaster {
    event_type: String,
    from_version: u32,
    to_version: u32,
    transform: Box<
        dyn Fn(serde_json::Value) -> Result<serde_json::Value, String> + Send + Sync,
    >,
}

impl FnUpcaster {
    /// Create an upcaster from `event_type` `from_version` to
    /// `to_version` using the given payload transform.
    pub fn new<F>(
        event_type: impl Into<String>,
        from_version: u32,
        to_version: u32,
        transform: F,
    ) -> Self
    where
        F: Fn(serde_json::Value) -> Result<serde_json::Value, String> + Send + Sync + 'static,
    {
        Self {
            event_type: event_type.into(),
            from_version,
            to_version,
            transform: Box::new(transform),
        }
    }
}

impl Upcaster for FnUpcaster {
    fn event_type(&self) -> &str {
        &self.event_type
    }

    fn from_version(&self) -> u32 {
        self.from_version
    }

    fn upcast(&self, payload: serde_json::Value) -> Result<Upcasted, UpcastError> {
        let payload = (self.transform)(payload).map_err(|reason| UpcastError::Transform {
            event_type: self.event_type.clone(),
            from_version: self.from_version,
            reason,
        })?;
        Ok(Upcasted {
            payload,
            to_version: self.to_version,
        })
    }
}

impl std::fmt::Debug for FnUpcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnUpcaster")
            .field("event_type", &self.event_type)
            .field("from_version", &self.from_version)
            .field("to_version", &self.to_version)
            .finish_non_exhaustive()
    }
}

/// Registry of upcasters keyed by `(event_type, schema_version)`.
///
/// Built once at startup, then shared read-only by every replaying
/// component.
#[derive(Default)]
pub struct UpcasterRegistry {
    transforms: HashMap<(String, u32), Box<dyn Upcaster>>,
    current: HashMap<String, u32>,
}

impl UpcasterRegistry {
    /// Create an empty registry.
    ///
    /// An empty registry passes every event through untouched.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an upcaster.
    ///
    /// # Errors
    ///
    /// Returns [`UpcastError::Duplicate`] if an upcaster for the same
    /// `(event_type, from_version)` is already registered.
    pub fn register<U: Upcaster + 'static>(&mut self, upcaster: U) -> Result<(), UpcastError> {
        let key = (upcaster.event_type().to_string(), upcaster.from_version());
        if self.transforms.contains_key(&key) {
            return Err(UpcastError::Duplicate {
                event_type: key.0,
                from_version: key.1,
            });
        }
        self.transforms.insert(key, Box::new(upcaster));
        Ok(())
    }

    /// Declare the current schema version for an event type.
    ///
    /// Once declared, an event of that type whose chain ends below the
    /// current version fails with [`UpcastError::MissingUpcaster`]
    /// instead of passing through stale. Event types without a
    /// declaration are passed through at whatever version the chain
    /// reaches.
    pub fn declare_current(&mut self, event_type: impl Into<String>, version: u32) {
        self.current.insert(event_type.into(), version);
    }

    /// Run an event through the chain until no further transform matches.
    ///
    /// Idempotent on already-current events: no transform matches their
    /// version, so they come back unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`UpcastError::Transform`], [`UpcastError::NonAdvancing`],
    /// or [`UpcastError::MissingUpcaster`]; all are fatal for the replay.
    pub fn apply(&self, event: RecordedEvent) -> Result<RecordedEvent, UpcastError> {
        let mut event = event;
        while let Some(upcaster) = self
            .transforms
            .get(&(event.event_type.clone(), event.schema_version))
        {
            let upcasted = upcaster.upcast(event.payload)?;
            if upcasted.to_version <= event.schema_version {
                return Err(UpcastError::NonAdvancing {
                    event_type: event.event_type,
                    from_version: event.schema_version,
                    to_version: upcasted.to_version,
                });
            }
            tracing::trace!(
                event_type = %event.event_type,
                from_version = event.schema_version,
                to_version = upcasted.to_version,
                "Upcast event payload"
            );
            event.payload = upcasted.payload;
            event.schema_version = upcasted.to_version;
        }

        if let Some(&current) = self.current.get(&event.event_type) {
            if event.schema_version < current {
                return Err(UpcastError::MissingUpcaster {
                    event_type: event.event_type,
                    reached: event.schema_version,
                    current,
                });
            }
        }

        Ok(event)
    }
}

impl std::fmt::Debug for UpcasterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpcasterRegistry")
            .field("transforms", &self.transforms.len())
            .field("current", &self.current)
            .finish()
    }
}
