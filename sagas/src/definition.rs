//! Saga definitions: the ordered list of steps an orchestrator runs.

use crate::activity::Activity;
use crate::retry::RetryPolicy;
use std::sync::Arc;
use std::time::Duration;

/// One step in a saga definition.
#[derive(Clone)]
pub struct SagaStep {
    /// Step name, unique within the definition and recorded in the
    /// journal.
    pub name: String,
    /// The activity that executes and compensates this step.
    pub activity: Arc<dyn Activity>,
    /// Per-step attempt timeout; `None` uses the orchestrator default.
    pub timeout: Option<Duration>,
    /// Per-step retry policy; `None` uses the orchestrator default.
    pub retry: Option<RetryPolicy>,
}

impl std::fmt::Debug for SagaStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SagaStep")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Named, ordered sequence of steps.
///
/// Built once at startup and shared; the orchestrator looks steps up by
/// index when resuming persisted instances, so a definition must not
/// change shape between runs of the same saga.
///
/// # Example
///
/// ```ignore
/// let definition = SagaDefinition::new("order_fulfillment")
///     .step("reserve_inventory", reserve)
///     .step("charge_payment", charge)
///     .step_with("ship_order", ship, |step| {
///         step.timeout = Some(Duration::from_secs(30));
///     });
/// ```
#[derive(Clone, Debug)]
pub struct SagaDefinition {
    name: String,
    steps: Vec<SagaStep>,
}

impl SagaDefinition {
    /// Create an empty definition.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step with default timeout and retry policy.
    #[must_use]
    pub fn step(self, name: impl Into<String>, activity: Arc<dyn Activity>) -> Self {
        self.step_with(name, activity, |_| {})
    }

    /// Append a step, customizing its timeout or retry policy.
    #[must_use]
    pub fn step_with(
        mut self,
        name: impl Into<String>,
        activity: Arc<dyn Activity>,
        configure: impl FnOnce(&mut SagaStep),
    ) -> Self {
        let mut step = SagaStep {
            name: name.into(),
            activity,
            timeout: None,
            retry: None,
        };
        configure(&mut step);
        self.steps.push(step);
        self
    }

    /// The definition's name, matched against persisted instances.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The steps in execution order.
    #[must_use]
    pub fn steps(&self) -> &[SagaStep] {
        &self.steps
    }

    /// The step at `index`, if it exists.
    #[must_use]
    pub fn step_at(&self, index: usize) -> Option<&SagaStep> {
        self.steps.get(index)
    }

    /// The step with the given name, if it exists.
    #[must_use]
    pub fn step_named(&self, name: &str) -> Option<&SagaStep> {
        self.steps.iter().find(|step| step.name == name)
    }
}
