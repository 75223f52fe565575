//! In-memory snapshot store.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use strata_core::snapshot::{Snapshot, SnapshotError, SnapshotStore};
use strata_core::stream::StreamId;

/// Keeps the latest snapshot per stream in a `HashMap`.
///
/// An incoming snapshot older than the stored one is ignored, so
/// concurrent writers cannot roll a stream's snapshot backwards.
#[derive(Clone, Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshots: Arc<RwLock<HashMap<StreamId, Snapshot>>>,
}

impl InMemorySnapshotStore {
    /// Create an empty snapshot store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of streams with a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Storage`] if the lock is poisoned.
    pub fn len(&self) -> Result<usize, SnapshotError> {
        Ok(self.read_guard()?.len())
    }

    /// Whether no snapshots are stored.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Storage`] if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, SnapshotError> {
        Ok(self.read_guard()?.is_empty())
    }

    fn read_guard(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<StreamId, Snapshot>>, SnapshotError> {
        self.snapshots
            .read()
            .map_err(|_| SnapshotError::Storage("snapshot lock poisoned".to_string()))
    }

    fn write_guard(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<StreamId, Snapshot>>, SnapshotError> {
        self.snapshots
            .write()
            .map_err(|_| SnapshotError::Storage("snapshot lock poisoned".to_string()))
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn save(
        &self,
        snapshot: Snapshot,
    ) -> Pin<Box<dyn Future<Output = Result<(), SnapshotError>> + Send + '_>> {
        Box::pin(async move {
            let mut snapshots = self.write_guard()?;
            match snapshots.get(&snapshot.stream_id) {
                Some(existing) if existing.version >= snapshot.version => {}
                _ => {
                    snapshots.insert(snapshot.stream_id.clone(), snapshot);
                }
            }
            Ok(())
        })
    }

    fn load(
        &self,
        stream_id: StreamId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Snapshot>, SnapshotError>> + Send + '_>> {
        Box::pin(async move { Ok(self.read_guard()?.get(&stream_id).cloned()) })
    }
}
