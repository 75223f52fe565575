//! In-memory read model store.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use strata_core::projection::{ProjectionError, ReadModelStore, Result};

/// Keyed JSON document store backed by a `HashMap`.
///
/// The upsert surface makes idempotent projection handlers natural:
/// reapplying the last event overwrites the same key with the same
/// document.
#[derive(Clone, Debug, Default)]
pub struct InMemoryReadModelStore {
    documents: Arc<RwLock<HashMap<String, serde_json::Value>>>,
}

impl InMemoryReadModelStore {
    /// Create an empty read model store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if the lock is poisoned.
    pub fn len(&self) -> Result<usize> {
        Ok(self.read_guard()?.len())
    }

    /// Whether the store holds no documents.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read_guard()?.is_empty())
    }

    /// All stored keys, for test assertions.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if the lock is poisoned.
    pub fn keys(&self) -> Result<Vec<String>> {
        Ok(self.read_guard()?.keys().cloned().collect())
    }

    fn read_guard(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, serde_json::Value>>> {
        self.documents
            .read()
            .map_err(|_| ProjectionError::Storage("read model lock poisoned".to_string()))
    }

    fn write_guard(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, serde_json::Value>>> {
        self.documents
            .write()
            .map_err(|_| ProjectionError::Storage("read model lock poisoned".to_string()))
    }
}

impl ReadModelStore for InMemoryReadModelStore {
    fn upsert(
        &self,
        key: &str,
        value: &serde_json::Value,
    ) -> impl Future<Output = Result<()>> + Send {
        let key = key.to_string();
        let value = value.clone();
        async move {
            self.write_guard()?.insert(key, value);
            Ok(())
        }
    }

    fn get(&self, key: &str) -> impl Future<Output = Result<Option<serde_json::Value>>> + Send {
        let key = key.to_string();
        async move { Ok(self.read_guard()?.get(&key).cloned()) }
    }

    fn delete(&self, key: &str) -> impl Future<Output = Result<()>> + Send {
        let key = key.to_string();
        async move {
            self.write_guard()?.remove(&key);
            Ok(())
        }
    }

    fn clear(&self) -> impl Future<Output = Result<()>> + Send {
        async move {
            self.write_guard()?.clear();
            Ok(())
        }
    }
}
