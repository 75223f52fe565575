//! In-memory saga instance store.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use strata_core::saga::{SagaId, SagaInstance, SagaStore, SagaStoreError};

/// Keeps saga instances in a `HashMap` keyed by id.
///
/// `save` replaces the whole instance; the orchestrator calls it after
/// every state transition.
#[derive(Clone, Debug, Default)]
pub struct InMemorySagaStore {
    instances: Arc<RwLock<HashMap<SagaId, SagaInstance>>>,
}

impl InMemorySagaStore {
    /// Create an empty saga store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored instances.
    ///
    /// # Errors
    ///
    /// Returns [`SagaStoreError::Storage`] if the lock is poisoned.
    pub fn len(&self) -> Result<usize, SagaStoreError> {
        Ok(self.read_guard()?.len())
    }

    /// Whether the store holds no instances.
    ///
    /// # Errors
    ///
    /// Returns [`SagaStoreError::Storage`] if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, SagaStoreError> {
        Ok(self.read_guard()?.is_empty())
    }

    fn read_guard(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<SagaId, SagaInstance>>, SagaStoreError>
    {
        self.instances
            .read()
            .map_err(|_| SagaStoreError::Storage("saga lock poisoned".to_string()))
    }

    fn write_guard(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<SagaId, SagaInstance>>, SagaStoreError>
    {
        self.instances
            .write()
            .map_err(|_| SagaStoreError::Storage("saga lock poisoned".to_string()))
    }
}

impl SagaStore for InMemorySagaStore {
    fn save(
        &self,
        instance: &SagaInstance,
    ) -> Pin<Box<dyn Future<Output = Result<(), SagaStoreError>> + Send + '_>> {
        let instance = instance.clone();
        Box::pin(async move {
            self.write_guard()?.insert(instance.saga_id, instance);
            Ok(())
        })
    }

    fn load(
        &self,
        saga_id: SagaId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<SagaInstance>, SagaStoreError>> + Send + '_>>
    {
        Box::pin(async move { Ok(self.read_guard()?.get(&saga_id).cloned()) })
    }
}
