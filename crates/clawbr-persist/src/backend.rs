//! Storage backend trait and error types
//!
//! Every stored value carries a version. Writes name the version they
//! expect to replace, so concurrent transitions on the same entity cannot
//! both succeed.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use tokio::sync::RwLock;

/// Storage error types
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Version conflict on {key}: expected {expected}")]
    VersionConflict { key: String, expected: u64 },

    #[error("Too much contention on {0}")]
    Contention(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

/// A stored value with its version
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedValue {
    pub version: u64,
    pub value: serde_json::Value,
}

/// Generic storage backend trait (Object Safe)
#[async_trait]
pub trait StorageBackend: Send + Sync + Debug {
    /// Get the backend name
    fn name(&self) -> &str;

    /// Check if backend is healthy
    async fn is_healthy(&self) -> bool;

    /// Get a value and its version
    async fn get_value(&self, key: &str) -> Result<Option<VersionedValue>, StorageError>;

    /// Conditional write. `expected = None` inserts and fails with
    /// `AlreadyExists` if the key is present; `Some(v)` replaces version `v`
    /// and fails with `VersionConflict` otherwise. Returns the new version.
    async fn put_value(
        &self,
        key: &str,
        expected: Option<u64>,
        value: serde_json::Value,
    ) -> Result<u64, StorageError>;

    /// Delete a value by key
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;

    /// Delete only if the stored version is still `expected`
    async fn delete_versioned(&self, key: &str, expected: u64) -> Result<bool, StorageError>;

    /// List all keys with prefix, sorted
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Count keys with prefix
    async fn count_keys(&self, prefix: &str) -> Result<usize, StorageError> {
        Ok(self.list_keys(prefix).await?.len())
    }
}

/// Extension trait for typed access
#[async_trait]
pub trait StorageExt {
    async fn get_typed<T: DeserializeOwned>(&self, key: &str) -> Result<Option<(u64, T)>, StorageError>;
    async fn insert_typed<T: Serialize + Send + Sync>(&self, key: &str, value: &T) -> Result<(), StorageError>;
}

#[async_trait]
impl<S: StorageBackend + ?Sized> StorageExt for S {
    async fn get_typed<T: DeserializeOwned>(&self, key: &str) -> Result<Option<(u64, T)>, StorageError> {
        match self.get_value(key).await? {
            Some(stored) => {
                let value = serde_json::from_value(stored.value)?;
                Ok(Some((stored.version, value)))
            }
            None => Ok(None),
        }
    }

    async fn insert_typed<T: Serialize + Send + Sync>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let json = serde_json::to_value(value)?;
        self.put_value(key, None, json).await.map(|_| ())
    }
}

/// In-memory storage backend (for testing and simulation)
#[derive(Debug, Default)]
pub struct MemoryBackend {
    data: RwLock<HashMap<String, VersionedValue>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn is_healthy(&self) -> bool {
        true
    }

    async fn get_value(&self, key: &str) -> Result<Option<VersionedValue>, StorageError> {
        let data = self.data.read().await;
        Ok(data.get(key).cloned())
    }

    async fn put_value(
        &self,
        key: &str,
        expected: Option<u64>,
        value: serde_json::Value,
    ) -> Result<u64, StorageError> {
        let mut data = self.data.write().await;
        let current = data.get(key).map(|stored| stored.version);
        let next = match (expected, current) {
            (None, None) => 1,
            (None, Some(_)) => return Err(StorageError::AlreadyExists(key.to_string())),
            (Some(_), None) => return Err(StorageError::NotFound(key.to_string())),
            (Some(want), Some(have)) if want == have => have + 1,
            (Some(want), Some(_)) => {
                return Err(StorageError::VersionConflict {
                    key: key.to_string(),
                    expected: want,
                })
            }
        };
        data.insert(
            key.to_string(),
            VersionedValue {
                version: next,
                value,
            },
        );
        Ok(next)
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.data.write().await.remove(key).is_some())
    }

    async fn delete_versioned(&self, key: &str, expected: u64) -> Result<bool, StorageError> {
        let mut data = self.data.write().await;
        match data.get(key) {
            Some(stored) if stored.version == expected => {
                data.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let data = self.data.read().await;
        let mut keys: Vec<String> = data
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct TestData {
        name: String,
        value: i32,
    }

    #[tokio::test]
    async fn test_memory_backend() {
        let backend = MemoryBackend::new();

        let data = TestData {
            name: "test".to_string(),
            value: 42,
        };

        backend.insert_typed("test:1", &data).await.unwrap();

        let retrieved: Option<(u64, TestData)> = backend.get_typed("test:1").await.unwrap();
        assert_eq!(retrieved, Some((1, data)));

        let keys = backend.list_keys("test:").await.unwrap();
        assert_eq!(keys, vec!["test:1"]);
        assert_eq!(backend.count_keys("test:").await.unwrap(), 1);

        assert!(backend.delete("test:1").await.unwrap());
        assert!(backend.get_value("test:1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_conditional_writes() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.put_value("k", None, json!(1)).await.unwrap(), 1);
        assert!(matches!(
            backend.put_value("k", None, json!(2)).await,
            Err(StorageError::AlreadyExists(_))
        ));
        assert_eq!(backend.put_value("k", Some(1), json!(2)).await.unwrap(), 2);
        assert!(matches!(
            backend.put_value("k", Some(1), json!(3)).await,
            Err(StorageError::VersionConflict { expected: 1, .. })
        ));
        let stored = backend.get_value("k").await.unwrap().unwrap();
        assert_eq!(stored.value, json!(2));
        assert!(!backend.delete_versioned("k", 1).await.unwrap());
        assert!(backend.delete_versioned("k", 2).await.unwrap());
        assert!(matches!(
            backend.put_value("missing", Some(1), json!(0)).await,
            Err(StorageError::NotFound(_))
        ));
    }
}
