//! Device Storage
//!
//! Small key/value persistence used to remember the last connected sensor
//! across restarts:
//! - `SledDeviceStore`: durable store backed by sled
//! - `InMemoryDeviceStore`: for tests and ephemeral sessions
//!
//! Values are wrapped in a `StoredValue` envelope recording when they were
//! written.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("lock poisoned: {0}")]
    Lock(String),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// A stored string with its write time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredValue {
    pub value: String,
    pub stored_at: DateTime<Utc>,
}

impl StoredValue {
    fn now(value: &str) -> Self {
        Self {
            value: value.to_string(),
            stored_at: Utc::now(),
        }
    }
}

/// String key/value store collaborator.
///
/// Implementations must be thread-safe (Send + Sync); the monitor calls them
/// from its actor task.
pub trait DeviceStore: Send + Sync {
    fn get_entry(&self, key: &str) -> Result<Option<StoredValue>, StorageError>;

    fn put(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;

    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.get_entry(key)?.map(|entry| entry.value))
    }
}

// ============================================================================
// sled backend
// ============================================================================

#[derive(Clone)]
pub struct SledDeviceStore {
    db: Arc<sled::Db>,
}

impl SledDeviceStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path.as_ref())?;
        info!(path = %path.as_ref().display(), "Device store opened");
        Ok(Self { db: Arc::new(db) })
    }
}

impl DeviceStore for SledDeviceStore {
    fn get_entry(&self, key: &str) -> Result<Option<StoredValue>, StorageError> {
        match self.db.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(&StoredValue::now(value))?;
        self.db.insert(key.as_bytes(), bytes)?;
        self.db.flush()?;
        debug!(key, "Stored value");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.db.remove(key.as_bytes())?;
        self.db.flush()?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sled"
    }
}

// ============================================================================
// In-memory backend
// ============================================================================

/// Not durable; data is lost when dropped.
#[derive(Default)]
pub struct InMemoryDeviceStore {
    values: RwLock<HashMap<String, StoredValue>>,
}

impl InMemoryDeviceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeviceStore for InMemoryDeviceStore {
    fn get_entry(&self, key: &str) -> Result<Option<StoredValue>, StorageError> {
        let values = self
            .values
            .read()
            .map_err(|e| StorageError::Lock(e.to_string()))?;
        Ok(values.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut values = self
            .values
            .write()
            .map_err(|e| StorageError::Lock(e.to_string()))?;
        values.insert(key.to_string(), StoredValue::now(value));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut values = self
            .values
            .write()
            .map_err(|e| StorageError::Lock(e.to_string()))?;
        values.remove(key);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "in-memory"
    }
}
