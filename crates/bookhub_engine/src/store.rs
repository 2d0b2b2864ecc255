use std::sync::Mutex;

use bookhub_core::{Snapshot, SNAPSHOT_KEY};
use bookhub_logging::bookhub_debug;

use crate::persist::{DurableDir, PersistError};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),
    #[error("stored snapshot is unreadable: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("snapshot store lock poisoned")]
    Poisoned,
}

/// Single-slot snapshot persistence; every write replaces the previous value.
#[async_trait::async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn write(&self, snapshot: &Snapshot) -> Result<(), StoreError>;
    async fn read(&self) -> Result<Option<Snapshot>, StoreError>;
}

#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    slot: Mutex<Option<Snapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn write(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let mut slot = self.slot.lock().map_err(|_| StoreError::Poisoned)?;
        *slot = Some(snapshot.clone());
        Ok(())
    }

    async fn read(&self) -> Result<Option<Snapshot>, StoreError> {
        let slot = self.slot.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(slot.clone())
    }
}

/// Snapshot kept as JSON under [`SNAPSHOT_KEY`] in a [`DurableDir`].
#[derive(Debug, Clone)]
pub struct DirSnapshotStore {
    storage: DurableDir,
}

impl DirSnapshotStore {
    pub fn new(storage: DurableDir) -> Self {
        Self { storage }
    }
}

#[async_trait::async_trait]
impl SnapshotStore for DirSnapshotStore {
    async fn write(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(snapshot)?;
        let path = self.storage.put(SNAPSHOT_KEY, &json)?;
        bookhub_debug!("snapshot of {} records written to {:?}", snapshot.total, path);
        Ok(())
    }

    async fn read(&self) -> Result<Option<Snapshot>, StoreError> {
        match self.storage.get(SNAPSHOT_KEY)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}
