//! Saga state: instances, journals, and the store that persists them.
//!
//! A saga is a sequence of steps with compensations, executed by an
//! orchestrator. This module holds the durable state shared between the
//! orchestrator and its store: where the saga is ([`SagaInstance`]),
//! what each finished step produced ([`CompletedStep`]), and the
//! append-only audit trail of everything that happened
//! ([`SagaJournalEntry`]).
//!
//! The instance is persisted after every state transition, so a crashed
//! orchestrator can resume exactly where it stopped: completed steps
//! are never re-executed and compensations are never repeated.

use crate::stream::GlobalPosition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier of a saga instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SagaId(Uuid);

impl SagaId {
    /// Generate a fresh random saga id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for SagaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle state of a saga instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SagaStatus {
    /// Executing steps forward.
    Running,
    /// A step failed (or the saga was cancelled); compensations for
    /// completed steps run in reverse order.
    Compensating,
    /// Every step completed.
    Completed,
    /// Compensation finished after a failure or cancellation.
    Failed,
}

impl SagaStatus {
    /// Whether the saga will make no further progress.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Running => "running",
            Self::Compensating => "compensating",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Durable record of a step that finished successfully.
///
/// `compensation_input` is captured at completion time so the
/// compensation can run later without re-deriving anything from live
/// state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompletedStep {
    /// Name of the step, matching its definition.
    pub step_name: String,
    /// What the step produced, available to later steps.
    pub result: serde_json::Value,
    /// Input the compensation needs to undo this step.
    pub compensation_input: serde_json::Value,
    /// Whether the compensation has run successfully.
    pub compensated: bool,
    /// Whether the compensation was attempted and gave up.
    pub compensation_failed: bool,
}

impl CompletedStep {
    /// Record a freshly completed, uncompensated step.
    #[must_use]
    pub fn new(
        step_name: impl Into<String>,
        result: serde_json::Value,
        compensation_input: serde_json::Value,
    ) -> Self {
        Self {
            step_name: step_name.into(),
            result,
            compensation_input,
            compensated: false,
            compensation_failed: false,
        }
    }
}

/// One entry in a saga's append-only audit journal.
///
/// The journal is evidence, not control state: the orchestrator drives
/// off `status`, `current_step`, and `completed_steps`, and appends
/// here so that every attempt, failure, and compensation is visible
/// after the fact.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SagaJournalEntry {
    /// A step attempt began.
    StepStarted {
        /// Step name.
        step: String,
        /// 1-based attempt number.
        attempt: u32,
        /// When the attempt began.
        at: DateTime<Utc>,
    },
    /// A step attempt succeeded.
    StepSucceeded {
        /// Step name.
        step: String,
        /// 1-based attempt number.
        attempt: u32,
        /// When the attempt succeeded.
        at: DateTime<Utc>,
    },
    /// A step attempt failed (it may be retried).
    StepFailed {
        /// Step name.
        step: String,
        /// 1-based attempt number.
        attempt: u32,
        /// Why the attempt failed.
        reason: String,
        /// When the attempt failed.
        at: DateTime<Utc>,
    },
    /// A compensation began for a completed step.
    CompensationStarted {
        /// Step being compensated.
        step: String,
        /// When the compensation began.
        at: DateTime<Utc>,
    },
    /// A compensation succeeded.
    CompensationSucceeded {
        /// Step that was compensated.
        step: String,
        /// When the compensation succeeded.
        at: DateTime<Utc>,
    },
    /// A compensation failed and was not retried further.
    CompensationFailed {
        /// Step whose compensation failed.
        step: String,
        /// Why the compensation failed.
        reason: String,
        /// When the compensation failed.
        at: DateTime<Utc>,
    },
    /// The saga was cancelled while running.
    Cancelled {
        /// When cancellation was requested.
        at: DateTime<Utc>,
    },
}

/// Durable state of one saga execution.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SagaInstance {
    /// Unique identifier of this execution.
    pub saga_id: SagaId,
    /// Name of the definition being executed.
    pub definition_name: String,
    /// Current lifecycle state.
    pub status: SagaStatus,
    /// Index of the next step to execute while `Running`.
    pub current_step: usize,
    /// Steps that finished, in completion order.
    pub completed_steps: Vec<CompletedStep>,
    /// Input the saga was started with.
    pub input: serde_json::Value,
    /// Append-only audit trail.
    pub journal: Vec<SagaJournalEntry>,
    /// Global log position that triggered the saga, when event-driven.
    pub triggered_by: Option<GlobalPosition>,
    /// When the saga was started.
    pub started_at: DateTime<Utc>,
}

impl SagaInstance {
    /// Create a fresh instance at the first step.
    #[must_use]
    pub fn new(
        saga_id: SagaId,
        definition_name: impl Into<String>,
        input: serde_json::Value,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            saga_id,
            definition_name: definition_name.into(),
            status: SagaStatus::Running,
            current_step: 0,
            completed_steps: Vec::new(),
            input,
            journal: Vec::new(),
            triggered_by: None,
            started_at,
        }
    }
}

/// Errors from saga store operations.
#[derive(Error, Debug)]
pub enum SagaStoreError {
    /// Underlying storage failure.
    #[error("Saga storage error: {0}")]
    Storage(String),

    /// No instance with the given id.
    #[error("Saga {0} not found")]
    NotFound(SagaId),

    /// Serialization/deserialization failure.
    #[error("Saga serialization error: {0}")]
    Serialization(String),
}

/// Persists saga instances keyed by [`SagaId`].
///
/// The orchestrator saves after every transition, so `save` is called
/// often and must replace the prior state wholesale.
pub trait SagaStore: Send + Sync {
    /// Save (insert or replace) an instance.
    ///
    /// # Errors
    ///
    /// Returns [`SagaStoreError::Storage`] on storage failure.
    fn save(
        &self,
        instance: &SagaInstance,
    ) -> Pin<Box<dyn Future<Output = Result<(), SagaStoreError>> + Send + '_>>;

    /// Load an instance by id, if present.
    ///
    /// # Errors
    ///
    /// Returns [`SagaStoreError::Storage`] on storage failure.
    fn load(
        &self,
        saga_id: SagaId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<SagaInstance>, SagaStoreError>> + Send + '_>>;
}
