//! In-memory projection checkpoint store.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use strata_core::projection::{CheckpointStore, ProjectionError, Result};
use strata_core::stream::GlobalPosition;

/// Tracks each projection's position in the global log in a `HashMap`.
#[derive(Clone, Debug, Default)]
pub struct InMemoryCheckpointStore {
    positions: Arc<RwLock<HashMap<String, GlobalPosition>>>,
}

impl InMemoryCheckpointStore {
    /// Create an empty checkpoint store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of projections with a checkpoint, for test assertions.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Checkpoint`] if the lock is poisoned.
    pub fn projection_names(&self) -> Result<Vec<String>> {
        Ok(self.read_guard()?.keys().cloned().collect())
    }

    fn read_guard(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, GlobalPosition>>> {
        self.positions
            .read()
            .map_err(|_| ProjectionError::Checkpoint("checkpoint lock poisoned".to_string()))
    }

    fn write_guard(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, GlobalPosition>>> {
        self.positions
            .write()
            .map_err(|_| ProjectionError::Checkpoint("checkpoint lock poisoned".to_string()))
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn load(
        &self,
        projection_name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<GlobalPosition>>> + Send + '_>> {
        let projection_name = projection_name.to_string();
        Box::pin(async move { Ok(self.read_guard()?.get(&projection_name).copied()) })
    }

    fn save(
        &self,
        projection_name: &str,
        position: GlobalPosition,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let projection_name = projection_name.to_string();
        Box::pin(async move {
            self.write_guard()?.insert(projection_name, position);
            Ok(())
        })
    }

    fn reset(
        &self,
        projection_name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let projection_name = projection_name.to_string();
        Box::pin(async move {
            self.write_guard()?.remove(&projection_name);
            Ok(())
        })
    }
}
