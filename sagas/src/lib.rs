//! # Strata Sagas
//!
//! Saga orchestration for Strata.
//!
//! This crate executes multi-step distributed processes with
//! compensations: each step runs a side-effecting activity, and when a
//! step exhausts its retries the completed steps are undone in reverse
//! order. Saga state is persisted after every transition through the
//! `SagaStore` trait from `strata-core`, so interrupted sagas resume
//! without repeating work.
//!
//! ## Core Components
//!
//! - **Activity**: the forward action and compensation of one step
//! - **`SagaDefinition`**: a named, ordered list of steps
//! - **`SagaOrchestrator`**: drives definitions to a terminal status
//! - **`RetryPolicy`**: exponential backoff budget for step attempts
//!
//! ## Example
//!
//! ```ignore
//! use strata_sagas::{SagaDefinition, SagaOrchestrator};
//!
//! let definition = SagaDefinition::new("order_fulfillment")
//!     .step("reserve_inventory", reserve)
//!     .step("charge_payment", charge)
//!     .step("ship_order", ship);
//!
//! let orchestrator = SagaOrchestrator::new(store);
//! let instance = orchestrator.start(&definition, input).await?;
//! ```

/// Forward actions and compensations for saga steps
pub mod activity;

/// Saga definitions: named, ordered step lists
pub mod definition;

/// Execution engine that drives sagas to a terminal status
pub mod orchestrator;

/// Retry policy with exponential backoff
pub mod retry;

pub use activity::{Activity, ActivityContext, ActivityError, StepOutput};
pub use definition::{SagaDefinition, SagaStep};
pub use orchestrator::{SagaError, SagaOrchestrator};
pub use retry::{RetryPolicy, RetryPolicyBuilder};
