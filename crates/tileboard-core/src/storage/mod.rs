//! Local key-value cache.
//!
//! A non-authoritative, restart-surviving store of JSON strings used as a
//! backup of tool data and for device preferences. Injected as a trait so the
//! core runs against an in-memory store in tests.

mod file;
mod memory;
mod preferences;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use preferences::{DisplayPreferences, WindowSettings, PREFERENCES_KEY};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Key holding the last known board snapshot of the signed-in owner.
pub const BOARD_BACKUP_KEY: &str = "board-backup";

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Storage error: {0}")]
    Other(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// A string key to JSON string store.
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` when absent.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Remove a value. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> StorageResult<()>;

    /// List all keys.
    fn keys(&self) -> StorageResult<Vec<String>>;
}

/// Read and deserialize a JSON value.
pub fn load_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> StorageResult<Option<T>> {
    match store.get(key)? {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

/// Serialize and write a JSON value.
pub fn save_json<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> StorageResult<()> {
    let json = serde_json::to_string(value)?;
    store.set(key, &json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::BoardSnapshot;

    #[test]
    fn test_json_helpers_roundtrip() {
        let store = MemoryStore::new();
        let snapshot = BoardSnapshot::new();

        assert!(load_json::<BoardSnapshot>(&store, BOARD_BACKUP_KEY).unwrap().is_none());
        save_json(&store, BOARD_BACKUP_KEY, &snapshot).unwrap();
        let loaded: Option<BoardSnapshot> = load_json(&store, BOARD_BACKUP_KEY).unwrap();
        assert_eq!(loaded, Some(snapshot));
    }

    #[test]
    fn test_load_json_reports_corrupt_values() {
        let store = MemoryStore::new();
        store.set(BOARD_BACKUP_KEY, "{not json").unwrap();
        let result = load_json::<BoardSnapshot>(&store, BOARD_BACKUP_KEY);
        assert!(matches!(result, Err(StorageError::Serialization(_))));
    }
}
