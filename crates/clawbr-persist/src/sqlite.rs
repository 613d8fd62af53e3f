//! SQLite backend implementation

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info};

use crate::backend::{StorageBackend, StorageError, VersionedValue};

/// SQLite configuration options
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Database URL (e.g., "sqlite:clawbr.db?mode=rwc" or "sqlite::memory:")
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Enable WAL journal mode for better concurrency
    pub wal_mode: bool,
    /// Busy timeout in seconds
    pub busy_timeout_secs: u32,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:clawbr.db?mode=rwc".to_string(),
            max_connections: 5,
            wal_mode: true,
            busy_timeout_secs: 30,
        }
    }
}

impl SqliteConfig {
    /// Create config for in-memory database (testing).
    ///
    /// A single connection, since every pooled connection to `:memory:`
    /// would otherwise see its own empty database.
    pub fn memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            wal_mode: false,
            busy_timeout_secs: 5,
        }
    }
}

/// SQLite storage backend
#[derive(Debug)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

fn query_err(e: sqlx::Error) -> StorageError {
    StorageError::Query(e.to_string())
}

impl SqliteBackend {
    /// Create a new SQLite backend with default config
    pub async fn new(url: &str) -> Result<Self, StorageError> {
        let config = SqliteConfig {
            url: url.to_string(),
            ..Default::default()
        };
        Self::new_with_config(config).await
    }

    /// Create a new SQLite backend with full configuration
    pub async fn new_with_config(config: SqliteConfig) -> Result<Self, StorageError> {
        let mut options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        options = options.pragma("busy_timeout", (config.busy_timeout_secs * 1000).to_string());
        if config.wal_mode {
            options = options.pragma("journal_mode", "WAL");
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        info!(url = %config.url, wal = config.wal_mode, "Connected to SQLite");

        let backend = Self { pool };
        backend.migrate().await?;
        Ok(backend)
    }

    /// Create the key-value table if it does not exist
    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS clawbr_kv (
                key TEXT PRIMARY KEY,
                version INTEGER NOT NULL,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(query_err)?;
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn is_healthy(&self) -> bool {
        !self.pool.is_closed()
    }

    async fn get_value(&self, key: &str) -> Result<Option<VersionedValue>, StorageError> {
        let row: Option<(i64, String)> =
            sqlx::query_as("SELECT version, value FROM clawbr_kv WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(query_err)?;

        match row {
            Some((version, text)) => Ok(Some(VersionedValue {
                version: version as u64,
                value: serde_json::from_str(&text)?,
            })),
            None => Ok(None),
        }
    }

    async fn put_value(
        &self,
        key: &str,
        expected: Option<u64>,
        value: serde_json::Value,
    ) -> Result<u64, StorageError> {
        let json = serde_json::to_string(&value)?;
        let now = chrono::Utc::now().timestamp();

        match expected {
            None => {
                let result = sqlx::query(
                    "INSERT INTO clawbr_kv (key, version, value, updated_at) VALUES (?, 1, ?, ?) \
                     ON CONFLICT(key) DO NOTHING",
                )
                .bind(key)
                .bind(json)
                .bind(now)
                .execute(&self.pool)
                .await
                .map_err(query_err)?;

                if result.rows_affected() == 0 {
                    return Err(StorageError::AlreadyExists(key.to_string()));
                }
                Ok(1)
            }
            Some(version) => {
                let result = sqlx::query(
                    "UPDATE clawbr_kv SET version = version + 1, value = ?, updated_at = ? \
                     WHERE key = ? AND version = ?",
                )
                .bind(json)
                .bind(now)
                .bind(key)
                .bind(version as i64)
                .execute(&self.pool)
                .await
                .map_err(query_err)?;

                if result.rows_affected() == 1 {
                    return Ok(version + 1);
                }

                debug!(key, expected = version, "Conditional update missed");
                match self.get_value(key).await? {
                    Some(_) => Err(StorageError::VersionConflict {
                        key: key.to_string(),
                        expected: version,
                    }),
                    None => Err(StorageError::NotFound(key.to_string())),
                }
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM clawbr_kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(query_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_versioned(&self, key: &str, expected: u64) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM clawbr_kv WHERE key = ? AND version = ?")
            .bind(key)
            .bind(expected as i64)
            .execute(&self.pool)
            .await
            .map_err(query_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        // substr avoids LIKE wildcards inside keys
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT key FROM clawbr_kv WHERE substr(key, 1, ?) = ? ORDER BY key",
        )
        .bind(prefix.chars().count() as i64)
        .bind(prefix)
        .fetch_all(&self.pool)
        .await
        .map_err(query_err)?;

        Ok(rows.into_iter().map(|(key,)| key).collect())
    }

    async fn count_keys(&self, prefix: &str) -> Result<usize, StorageError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM clawbr_kv WHERE substr(key, 1, ?) = ?")
                .bind(prefix.chars().count() as i64)
                .bind(prefix)
                .fetch_one(&self.pool)
                .await
                .map_err(query_err)?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StorageExt;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct TestData {
        name: String,
        value: i32,
    }

    #[tokio::test]
    async fn test_sqlite_backend() {
        let backend = SqliteBackend::new_with_config(SqliteConfig::memory())
            .await
            .unwrap();

        let data = TestData {
            name: "test_sql".to_string(),
            value: 99,
        };

        backend.insert_typed("sql:1", &data).await.unwrap();

        let retrieved: Option<(u64, TestData)> = backend.get_typed("sql:1").await.unwrap();
        assert_eq!(retrieved, Some((1, data)));

        let keys = backend.list_keys("sql:").await.unwrap();
        assert_eq!(keys, vec!["sql:1"]);
        assert_eq!(backend.count_keys("sql:").await.unwrap(), 1);
        assert_eq!(backend.count_keys("sql_").await.unwrap(), 0);

        assert!(backend.delete("sql:1").await.unwrap());
        assert!(backend.get_value("sql:1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sqlite_version_conflict() {
        let backend = SqliteBackend::new_with_config(SqliteConfig::memory())
            .await
            .unwrap();
        backend.put_value("k", None, serde_json::json!({"n": 1})).await.unwrap();
        assert_eq!(
            backend.put_value("k", Some(1), serde_json::json!({"n": 2})).await.unwrap(),
            2
        );
        let stale = backend.put_value("k", Some(1), serde_json::json!({"n": 3})).await;
        assert!(matches!(stale, Err(StorageError::VersionConflict { .. })));
        assert!(matches!(
            backend.put_value("k", None, serde_json::json!({})).await,
            Err(StorageError::AlreadyExists(_))
        ));
    }
}
