//! Saga orchestrator: drives definitions forward, unwinds on failure.
//!
//! The orchestrator executes a [`SagaDefinition`] step by step,
//! persisting the [`SagaInstance`](strata_core::saga::SagaInstance)
//! after every transition. That persistence discipline is what makes
//! `resume` safe: a completed step is never re-executed and a finished
//! compensation is never repeated, no matter where the process died.
//!
//! # Failure handling
//!
//! A failed attempt is retried with exponential backoff up to the
//! step's retry budget (attempts that return
//! [`ActivityError::Permanent`] skip the remaining retries). When the
//! budget is exhausted the saga flips to `Compensating` and the
//! compensations of all completed steps run in reverse completion
//! order. A compensation that itself fails is recorded in the journal
//! and skipped; the remaining compensations still run, and the saga
//! ends `Failed` either way.

use crate::activity::{ActivityContext, ActivityError, StepOutput};
use crate::definition::{SagaDefinition, SagaStep};
use crate::retry::RetryPolicy;
use std::sync::Arc;
use std::time::Duration;
use strata_core::clock::{Clock, SystemClock};
use strata_core::saga::{
    CompletedStep, SagaId, SagaInstance, SagaJournalEntry, SagaStatus, SagaStore, SagaStoreError,
};
use thiserror::Error;

/// Errors from orchestrating a saga.
#[derive(Error, Debug)]
pub enum SagaError {
    /// The saga store failed.
    #[error(transparent)]
    Store(#[from] SagaStoreError),

    /// No persisted instance with this id.
    #[error("Saga {0} not found")]
    NotFound(SagaId),

    /// The persisted instance belongs to a different definition.
    #[error("Saga {saga_id} belongs to definition '{actual}', not '{expected}'")]
    DefinitionMismatch {
        /// The instance in question.
        saga_id: SagaId,
        /// The definition the caller passed.
        expected: String,
        /// The definition recorded on the instance.
        actual: String,
    },

    /// The persisted step index does not exist in the definition.
    ///
    /// Happens when a definition loses steps between runs.
    #[error("Saga {saga_id} is at step {index}, which '{definition}' does not have")]
    UnknownStep {
        /// The instance in question.
        saga_id: SagaId,
        /// The persisted step index.
        index: usize,
        /// The definition name.
        definition: String,
    },

    /// The saga already reached a terminal status.
    #[error("Saga {saga_id} is already {status}")]
    AlreadyTerminal {
        /// The instance in question.
        saga_id: SagaId,
        /// Its terminal status.
        status: SagaStatus,
    },
}

/// Executes saga definitions against a [`SagaStore`].
///
/// One orchestrator serves many definitions and instances; it holds no
/// per-saga state of its own.
///
/// # Example
///
/// ```ignore
/// let orchestrator = SagaOrchestrator::new(store)
///     .with_retry_policy(RetryPolicy::builder().max_retries(2).build())
///     .with_step_timeout(Duration::from_secs(10));
///
/// let instance = orchestrator.start(&definition, input).await?;
/// assert_eq!(instance.status, SagaStatus::Completed);
/// ```
pub struct SagaOrchestrator {
    store: Arc<dyn SagaStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    compensation_retry: Option<RetryPolicy>,
    step_timeout: Duration,
}

impl SagaOrchestrator {
    /// Default per-attempt timeout for steps that don't override it.
    pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(30);

    /// Create an orchestrator with default retry policy and timeout,
    /// and single-attempt compensations.
    #[must_use]
    pub fn new(store: Arc<dyn SagaStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            retry: RetryPolicy::default(),
            compensation_retry: None,
            step_timeout: Self::DEFAULT_STEP_TIMEOUT,
        }
    }

    /// Inject a clock, for deterministic journal timestamps in tests.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Default retry policy for steps that don't set their own.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Retry failed compensations under this policy instead of the
    /// default single attempt.
    #[must_use]
    pub fn with_compensation_retry(mut self, retry: RetryPolicy) -> Self {
        self.compensation_retry = Some(retry);
        self
    }

    /// Default per-attempt timeout for steps that don't set their own.
    #[must_use]
    pub const fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// Start a new saga and drive it to a terminal status.
    ///
    /// The instance is persisted before the first step runs, so a crash
    /// mid-saga leaves a resumable record.
    ///
    /// # Errors
    ///
    /// Returns [`SagaError::Store`] if persistence fails. Step failures
    /// do not surface as errors; they end the saga in
    /// [`SagaStatus::Failed`] with the journal explaining why.
    pub async fn start(
        &self,
        definition: &SagaDefinition,
        input: serde_json::Value,
    ) -> Result<SagaInstance, SagaError> {
        let saga_id = SagaId::generate();
        let mut instance =
            SagaInstance::new(saga_id, definition.name(), input, self.clock.now());
        self.store.save(&instance).await?;
        tracing::info!(saga_id = %saga_id, definition = definition.name(), "Saga started");

        self.drive(definition, &mut instance).await?;
        Ok(instance)
    }

    /// Resume a persisted saga from wherever it stopped.
    ///
    /// A `Running` instance continues forward from `current_step`; a
    /// `Compensating` instance continues unwinding. Completed steps and
    /// finished compensations are not repeated.
    ///
    /// # Errors
    ///
    /// Returns [`SagaError::NotFound`] for an unknown id,
    /// [`SagaError::AlreadyTerminal`] if the saga already finished, and
    /// [`SagaError::DefinitionMismatch`] if `definition` is not the one
    /// the instance was started with.
    pub async fn resume(
        &self,
        definition: &SagaDefinition,
        saga_id: SagaId,
    ) -> Result<SagaInstance, SagaError> {
        let mut instance = self.load_for(definition, saga_id).await?;
        tracing::info!(
            saga_id = %saga_id,
            status = %instance.status,
            current_step = instance.current_step,
            "Saga resumed"
        );

        self.drive(definition, &mut instance).await?;
        Ok(instance)
    }

    /// Cancel a saga: stop executing forward and compensate whatever
    /// has completed.
    ///
    /// # Errors
    ///
    /// Same as [`SagaOrchestrator::resume`]; cancelling a terminal saga
    /// is [`SagaError::AlreadyTerminal`].
    pub async fn cancel(
        &self,
        definition: &SagaDefinition,
        saga_id: SagaId,
    ) -> Result<SagaInstance, SagaError> {
        let mut instance = self.load_for(definition, saga_id).await?;

        instance.journal.push(SagaJournalEntry::Cancelled {
            at: self.clock.now(),
        });
        instance.status = SagaStatus::Compensating;
        self.store.save(&instance).await?;
        tracing::info!(saga_id = %saga_id, "Saga cancelled, compensating");

        self.compensate(definition, &mut instance).await?;
        Ok(instance)
    }

    async fn load_for(
        &self,
        definition: &SagaDefinition,
        saga_id: SagaId,
    ) -> Result<SagaInstance, SagaError> {
        let instance = self
            .store
            .load(saga_id)
            .await?
            .ok_or(SagaError::NotFound(saga_id))?;

        if instance.status.is_terminal() {
            return Err(SagaError::AlreadyTerminal {
                saga_id,
                status: instance.status,
            });
        }
        if instance.definition_name != definition.name() {
            return Err(SagaError::DefinitionMismatch {
                saga_id,
                expected: definition.name().to_string(),
                actual: instance.definition_name,
            });
        }
        Ok(instance)
    }

    /// Advance a non-terminal instance until it reaches `Completed` or
    /// `Failed`.
    async fn drive(
        &self,
        definition: &SagaDefinition,
        instance: &mut SagaInstance,
    ) -> Result<(), SagaError> {
        if instance.status == SagaStatus::Running {
            self.run_forward(definition, instance).await?;
        }
        if instance.status == SagaStatus::Compensating {
            self.compensate(definition, instance).await?;
        }
        Ok(())
    }

    async fn run_forward(
        &self,
        definition: &SagaDefinition,
        instance: &mut SagaInstance,
    ) -> Result<(), SagaError> {
        while instance.current_step < definition.steps().len() {
            let index = instance.current_step;
            let Some(step) = definition.step_at(index) else {
                return Err(SagaError::UnknownStep {
                    saga_id: instance.saga_id,
                    index,
                    definition: definition.name().to_string(),
                });
            };

            match self.run_step(step, instance).await? {
                Some(output) => {
                    instance.completed_steps.push(CompletedStep::new(
                        step.name.clone(),
                        output.result,
                        output.compensation_input,
                    ));
                    instance.current_step += 1;
                    self.store.save(instance).await?;
                }
                None => {
                    instance.status = SagaStatus::Compensating;
                    self.store.save(instance).await?;
                    return Ok(());
                }
            }
        }

        instance.status = SagaStatus::Completed;
        self.store.save(instance).await?;
        tracing::info!(saga_id = %instance.saga_id, "Saga completed");
        Ok(())
    }

    /// Run one step through its retry budget. `Ok(None)` means the
    /// budget is exhausted and the saga must compensate.
    async fn run_step(
        &self,
        step: &SagaStep,
        instance: &mut SagaInstance,
    ) -> Result<Option<StepOutput>, SagaError> {
        let retry = step.retry.as_ref().unwrap_or(&self.retry);
        let timeout = step.timeout.unwrap_or(self.step_timeout);
        let context = ActivityContext {
            saga_id: instance.saga_id,
            input: instance.input.clone(),
            completed_steps: instance.completed_steps.clone(),
        };

        for attempt in 1..=retry.max_attempts() {
            instance.journal.push(SagaJournalEntry::StepStarted {
                step: step.name.clone(),
                attempt,
                at: self.clock.now(),
            });
            self.store.save(instance).await?;

            let outcome = tokio::time::timeout(timeout, step.activity.execute(&context)).await;
            let result = outcome.unwrap_or_else(|_| {
                Err(ActivityError::Transient(format!(
                    "timed out after {timeout:?}"
                )))
            });

            match result {
                Ok(output) => {
                    instance.journal.push(SagaJournalEntry::StepSucceeded {
                        step: step.name.clone(),
                        attempt,
                        at: self.clock.now(),
                    });
                    tracing::debug!(
                        saga_id = %instance.saga_id,
                        step = %step.name,
                        attempt,
                        "Step succeeded"
                    );
                    return Ok(Some(output));
                }
                Err(error) => {
                    instance.journal.push(SagaJournalEntry::StepFailed {
                        step: step.name.clone(),
                        attempt,
                        reason: error.to_string(),
                        at: self.clock.now(),
                    });
                    self.store.save(instance).await?;
                    tracing::warn!(
                        saga_id = %instance.saga_id,
                        step = %step.name,
                        attempt,
                        error = %error,
                        "Step attempt failed"
                    );

                    if !error.is_retryable() || attempt == retry.max_attempts() {
                        tracing::error!(
                            saga_id = %instance.saga_id,
                            step = %step.name,
                            "Step failed, saga will compensate"
                        );
                        return Ok(None);
                    }
                    tokio::time::sleep(retry.delay_for_attempt(attempt - 1)).await;
                }
            }
        }

        Ok(None)
    }

    /// Unwind completed steps in reverse completion order, then mark
    /// the saga `Failed`.
    async fn compensate(
        &self,
        definition: &SagaDefinition,
        instance: &mut SagaInstance,
    ) -> Result<(), SagaError> {
        for index in (0..instance.completed_steps.len()).rev() {
            let completed = &instance.completed_steps[index];
            if completed.compensated || completed.compensation_failed {
                continue;
            }
            let step_name = completed.step_name.clone();
            let compensation_input = completed.compensation_input.clone();

            instance.journal.push(SagaJournalEntry::CompensationStarted {
                step: step_name.clone(),
                at: self.clock.now(),
            });
            self.store.save(instance).await?;

            let succeeded = match definition.step_named(&step_name) {
                Some(step) => {
                    self.run_compensation(step, instance, &compensation_input)
                        .await
                }
                None => Err(format!(
                    "step '{step_name}' no longer exists in definition '{}'",
                    definition.name()
                )),
            };

            match succeeded {
                Ok(()) => {
                    instance.completed_steps[index].compensated = true;
                    instance
                        .journal
                        .push(SagaJournalEntry::CompensationSucceeded {
                            step: step_name.clone(),
                            at: self.clock.now(),
                        });
                    tracing::debug!(
                        saga_id = %instance.saga_id,
                        step = %step_name,
                        "Compensation succeeded"
                    );
                }
                Err(reason) => {
                    instance.completed_steps[index].compensation_failed = true;
                    instance.journal.push(SagaJournalEntry::CompensationFailed {
                        step: step_name.clone(),
                        reason: reason.clone(),
                        at: self.clock.now(),
                    });
                    tracing::error!(
                        saga_id = %instance.saga_id,
                        step = %step_name,
                        reason = %reason,
                        "Compensation failed, continuing with earlier steps"
                    );
                }
            }
            self.store.save(instance).await?;
        }

        instance.status = SagaStatus::Failed;
        self.store.save(instance).await?;
        tracing::info!(saga_id = %instance.saga_id, "Saga failed after compensation");
        Ok(())
    }

    /// Run one compensation through its (usually single-attempt) retry
    /// budget. Returns the final failure reason on exhaustion.
    async fn run_compensation(
        &self,
        step: &SagaStep,
        instance: &SagaInstance,
        compensation_input: &serde_json::Value,
    ) -> Result<(), String> {
        let single_attempt = RetryPolicy::no_retries();
        let retry = self.compensation_retry.as_ref().unwrap_or(&single_attempt);
        let timeout = step.timeout.unwrap_or(self.step_timeout);
        let context = ActivityContext {
            saga_id: instance.saga_id,
            input: instance.input.clone(),
            completed_steps: instance.completed_steps.clone(),
        };

        let mut last_reason = String::new();
        for attempt in 1..=retry.max_attempts() {
            let outcome = tokio::time::timeout(
                timeout,
                step.activity.compensate(&context, compensation_input),
            )
            .await;
            let result = outcome.unwrap_or_else(|_| {
                Err(ActivityError::Transient(format!(
                    "timed out after {timeout:?}"
                )))
            });

            match result {
                Ok(()) => return Ok(()),
                Err(error) => {
                    last_reason = error.to_string();
                    if !error.is_retryable() || attempt == retry.max_attempts() {
                        break;
                    }
                    tokio::time::sleep(retry.delay_for_attempt(attempt - 1)).await;
                }
            }
        }
        Err(last_reason)
    }
}

impl std::fmt::Debug for SagaOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SagaOrchestrator")
            .field("retry", &self.retry)
            .field("compensation_retry", &self.compensation_retry)
            .field("step_timeout", &self.step_timeout)
            .finish_non_exhaustive()
    }
}
