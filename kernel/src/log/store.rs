// Record Log Storage Abstraction
//
// Defines the durability contract for player record logs. The record
// system writes through this interface fire-and-forget: failures are
// logged by the caller and never change in-memory state.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use super::RecordLogSnapshot;
use crate::player::PlayerId;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored record log is malformed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Storage backend for player record logs.
///
/// Implementations must replace the whole stored log on `save`; partial
/// writes are not part of the contract.
pub trait RecordLogStore: Send + Sync {
    fn save(&self, player: &PlayerId, snapshot: &RecordLogSnapshot) -> Result<(), StoreError>;

    /// Load the stored log, `None` for a player that was never saved.
    fn load(&self, player: &PlayerId) -> Result<Option<RecordLogSnapshot>, StoreError>;
}

/// Process-local store, mostly for tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    logs: Mutex<HashMap<PlayerId, RecordLogSnapshot>>,
    writes: Mutex<usize>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful saves since creation.
    pub fn writes(&self) -> usize {
        self.writes.lock().map(|w| *w).unwrap_or(0)
    }
}

impl RecordLogStore for InMemoryRecordStore {
    fn save(&self, player: &PlayerId, snapshot: &RecordLogSnapshot) -> Result<(), StoreError> {
        let mut logs = self
            .logs
            .lock()
            .map_err(|_| StoreError::Unavailable("log map poisoned".into()))?;
        logs.insert(*player, snapshot.clone());

        if let Ok(mut writes) = self.writes.lock() {
            *writes += 1;
        }
        Ok(())
    }

    fn load(&self, player: &PlayerId) -> Result<Option<RecordLogSnapshot>, StoreError> {
        let logs = self
            .logs
            .lock()
            .map_err(|_| StoreError::Unavailable("log map poisoned".into()))?;
        Ok(logs.get(player).cloned())
    }
}

/// One pretty-printed JSON document per player under `dir`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, player: &PlayerId) -> PathBuf {
        self.dir.join(format!("{player}.json"))
    }
}

impl RecordLogStore for JsonFileStore {
    fn save(&self, player: &PlayerId, snapshot: &RecordLogSnapshot) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir)?;
        let data = serde_json::to_string_pretty(snapshot)?;
        std::fs::write(self.path_for(player), data)?;
        Ok(())
    }

    fn load(&self, player: &PlayerId) -> Result<Option<RecordLogSnapshot>, StoreError> {
        let path = self.path_for(player);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&data)?))
    }
}
