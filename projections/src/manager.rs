//! `ProjectionManager`: checkpointed catch-up over the global event log.
//!
//! # Overview
//!
//! The manager coordinates the lifecycle of one projection:
//! - Reads the global log in pages, starting from the projection's
//!   checkpoint
//! - Dispatches each event to the projection handler
//! - Saves the checkpoint after each event is applied
//! - Retries handler failures with backoff, without touching other
//!   projections
//! - Supports rebuild from scratch
//!
//! # Checkpoint discipline
//!
//! The checkpoint is saved *after* the handler succeeds. A crash
//! between the two redelivers the last event on restart, so handlers
//! see at-least-once delivery and must be idempotent. A handler error
//! never advances the checkpoint: the event is retried until it
//! applies, and only this projection stalls.
//!
//! # Example
//!
//! ```ignore
//! let (manager, shutdown) = ProjectionManager::new(projection, store, checkpoints);
//!
//! // Tail the log until a shutdown signal arrives.
//! tokio::spawn(async move { manager.run().await });
//!
//! // In a signal handler:
//! shutdown.send(true).ok();
//! ```

use std::sync::Arc;
use std::time::Duration;
use strata_core::projection::{CheckpointStore, Projection, Result};
use strata_core::store::EventStore;
use strata_core::stream::GlobalPosition;
use tokio::sync::watch;

/// Drives one projection over the global event log.
///
/// Each projection gets its own manager and its own checkpoint, so
/// projections progress independently: one stalled handler does not
/// hold back the others.
pub struct ProjectionManager<P>
where
    P: Projection,
{
    projection: Arc<P>,
    store: Arc<dyn EventStore>,
    checkpoints: Arc<dyn CheckpointStore>,
    /// Events fetched per page of the global log.
    batch_size: usize,
    /// How long to wait when the log has no new events.
    poll_interval: Duration,
    /// Cap for handler-retry backoff.
    max_retry_delay: Duration,
    /// Shutdown signal.
    shutdown: watch::Receiver<bool>,
}

impl<P> ProjectionManager<P>
where
    P: Projection,
{
    /// Default page size for reading the global log.
    pub const DEFAULT_BATCH_SIZE: usize = 100;

    /// Default idle poll interval.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

    /// Default cap for handler-retry backoff.
    pub const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

    /// Create a manager for `projection`.
    ///
    /// Returns the manager and a shutdown sender; send `true` to stop
    /// [`ProjectionManager::run`] gracefully after the current event.
    #[must_use]
    pub fn new(
        projection: Arc<P>,
        store: Arc<dyn EventStore>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> (Self, watch::Sender<bool>) {
        let (shutdown_tx, shutdown) = watch::channel(false);
        let manager = Self {
            projection,
            store,
            checkpoints,
            batch_size: Self::DEFAULT_BATCH_SIZE,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            max_retry_delay: Self::DEFAULT_MAX_RETRY_DELAY,
            shutdown,
        };
        (manager, shutdown_tx)
    }

    /// Set the page size for reading the global log.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set how long to sleep when the projection has caught up.
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run until shutdown: catch up, then tail the log.
    ///
    /// Handler errors are retried in place with capped exponential
    /// backoff; checkpoint and store errors are retried the same way.
    /// The method only returns when the shutdown signal fires.
    ///
    /// # Errors
    ///
    /// Returns an error only if the initial checkpoint load keeps
    /// failing; everything after that is retried internally.
    pub async fn run(self) -> Result<()> {
        let name = self.projection.name().to_string();
        let mut position = self.load_checkpoint().await?;
        tracing::info!(projection = %name, position = %position, "Projection starting");

        let mut retry_delay = self.poll_interval;
        loop {
            if *self.shutdown.borrow() {
                tracing::info!(projection = %name, "Projection shutting down");
                return Ok(());
            }

            match self.process_page(position).await {
                Ok(Some(new_position)) => {
                    position = new_position;
                    retry_delay = self.poll_interval;
                }
                Ok(None) => {
                    // Caught up; wait for new events or shutdown.
                    retry_delay = self.poll_interval;
                    let mut shutdown = self.shutdown.clone();
                    tokio::select! {
                        _ = tokio::time::sleep(self.poll_interval) => {}
                        _ = shutdown.changed() => {}
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        projection = %name,
                        %error,
                        retry_delay_ms = retry_delay.as_millis(),
                        "Projection error, backing off"
                    );
                    let mut shutdown = self.shutdown.clone();
                    tokio::select! {
                        _ = tokio::time::sleep(retry_delay) => {}
                        _ = shutdown.changed() => {}
                    }
                    retry_delay = (retry_delay * 2).min(self.max_retry_delay);
                }
            }
        }
    }

    /// Process events until the projection reaches the end of the log,
    /// then return.
    ///
    /// Unlike [`ProjectionManager::run`] this surfaces errors instead of
    /// retrying, which makes it the right entry point for tests and
    /// one-shot migrations.
    ///
    /// # Errors
    ///
    /// Returns the first handler, checkpoint, or store error.
    pub async fn catch_up(&self) -> Result<()> {
        let mut position = self.load_checkpoint().await?;
        while let Some(new_position) = self.process_page(position).await? {
            position = new_position;
        }
        Ok(())
    }

    /// Rebuild from scratch: reset the read model, drop the checkpoint,
    /// and replay the whole log.
    ///
    /// # Errors
    ///
    /// Returns the first error from reset, replay, or checkpointing.
    pub async fn rebuild(&self) -> Result<()> {
        let name = self.projection.name();
        tracing::info!(projection = %name, "Rebuilding projection");
        self.projection.reset().await?;
        self.checkpoints.reset(name).await?;
        self.catch_up().await
    }

    async fn load_checkpoint(&self) -> Result<GlobalPosition> {
        Ok(self
            .checkpoints
            .load(self.projection.name())
            .await?
            .unwrap_or(GlobalPosition::START))
    }

    /// Apply one page of events. Returns the new position, or `None`
    /// when the page was empty (caught up).
    async fn process_page(&self, position: GlobalPosition) -> Result<Option<GlobalPosition>> {
        let events = self.store.read_all(position, self.batch_size).await?;
        if events.is_empty() {
            return Ok(None);
        }

        let name = self.projection.name();
        let mut position = position;
        for event in events {
            self.projection.apply(&event).await?;
            self.checkpoints.save(name, event.global_position).await?;
            position = event.global_position;
        }
        tracing::debug!(projection = %name, position = %position, "Page applied");
        Ok(Some(position))
    }
}

impl<P: Projection> std::fmt::Debug for ProjectionManager<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectionManager")
            .field("projection", &self.projection.name())
            .field("batch_size", &self.batch_size)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}
