//! Saga activities: the forward action and compensation of one step.
//!
//! An [`Activity`] is the side-effecting unit a saga step runs. It sees
//! an [`ActivityContext`] with the saga's input and everything earlier
//! steps produced, and returns a [`StepOutput`] whose
//! `compensation_input` is persisted so the compensation can run later
//! without touching live state.

use std::future::Future;
use std::pin::Pin;
use strata_core::saga::{CompletedStep, SagaId};
use thiserror::Error;

/// Error from executing or compensating an activity.
///
/// The orchestrator treats every variant as retryable up to the step's
/// retry budget; an activity that knows a failure is permanent returns
/// [`ActivityError::Permanent`] to stop retries immediately.
#[derive(Error, Debug)]
pub enum ActivityError {
    /// Transient failure; the orchestrator may retry the attempt.
    #[error("Activity failed: {0}")]
    Transient(String),

    /// Permanent failure; retrying cannot help.
    #[error("Activity failed permanently: {0}")]
    Permanent(String),
}

impl ActivityError {
    /// Whether the orchestrator should retry after this error.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// What the orchestrator hands an activity on each attempt.
#[derive(Clone, Debug)]
pub struct ActivityContext {
    /// The saga instance this attempt belongs to, usable as an
    /// idempotency key by external systems.
    pub saga_id: SagaId,
    /// The input the saga was started with.
    pub input: serde_json::Value,
    /// Steps that have already completed, in order, with their results.
    pub completed_steps: Vec<CompletedStep>,
}

impl ActivityContext {
    /// Result of a named earlier step, if it has completed.
    #[must_use]
    pub fn step_result(&self, step_name: &str) -> Option<&serde_json::Value> {
        self.completed_steps
            .iter()
            .find(|step| step.step_name == step_name)
            .map(|step| &step.result)
    }
}

/// What a successful step attempt produced.
#[derive(Clone, Debug)]
pub struct StepOutput {
    /// Result visible to later steps via [`ActivityContext::step_result`].
    pub result: serde_json::Value,
    /// Input the compensation will receive if the saga unwinds.
    pub compensation_input: serde_json::Value,
}

impl StepOutput {
    /// A step output whose compensation input is the result itself.
    #[must_use]
    pub fn new(result: serde_json::Value) -> Self {
        Self {
            compensation_input: result.clone(),
            result,
        }
    }

    /// A step output with a distinct compensation input.
    #[must_use]
    pub const fn with_compensation_input(
        result: serde_json::Value,
        compensation_input: serde_json::Value,
    ) -> Self {
        Self {
            result,
            compensation_input,
        }
    }
}

/// The forward action and compensation of one saga step.
///
/// Dyn-compatible so definitions can hold heterogeneous steps as
/// `Arc<dyn Activity>`. Both directions should be idempotent: a crash
/// between effect and persistence means the orchestrator may run an
/// attempt twice.
pub trait Activity: Send + Sync {
    /// Run the step's forward action.
    ///
    /// # Errors
    ///
    /// Returns [`ActivityError`] if the action failed; transient errors
    /// are retried within the step's retry budget.
    fn execute<'a>(
        &'a self,
        context: &'a ActivityContext,
    ) -> Pin<Box<dyn Future<Output = Result<StepOutput, ActivityError>> + Send + 'a>>;

    /// Undo a previously successful execution.
    ///
    /// `compensation_input` is the value captured when the step
    /// completed.
    ///
    /// # Errors
    ///
    /// Returns [`ActivityError`] if the compensation failed. The
    /// orchestrator records the failure and continues compensating
    /// earlier steps.
    fn compensate<'a>(
        &'a self,
        context: &'a ActivityContext,
        compensation_input: &'a serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<(), ActivityError>> + Send + 'a>>;
}
