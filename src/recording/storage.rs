// src/recording/storage.rs
//! Named-blob persistence for the authoritative context
//!
//! The event store only needs "put/get a named JSON blob". Two backends are
//! provided: SQLite (one `kv` table) for real use and an in-memory map for
//! tests and ephemeral sessions.

use crate::utils::errors::{EngineError, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Storage keys
pub mod keys {
    pub const RECORDING: &str = "recording";
    pub const PAUSED: &str = "paused";
    pub const LOGS: &str = "logs";
    pub const SETTINGS: &str = "settings";
}

/// Named JSON blob storage
#[async_trait]
pub trait KeyValueStorage: Send + Sync {
    /// Read a blob, `None` when the key was never written
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Replace a blob
    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Replace several blobs
    async fn set_many(&self, entries: Vec<(&'static str, Value)>) -> Result<()> {
        for (key, value) in entries {
            self.set(key, value).await?;
        }
        Ok(())
    }
}

/// SQLite-backed storage
pub struct SqliteStorage {
    path: PathBuf,
    db: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Open (or create) the database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                EngineError::StorageFailed(format!("Failed to create directory: {}", e))
            })?;
        }

        let conn = Connection::open(&path).map_err(|e| {
            EngineError::StorageFailed(format!("Failed to open database: {}", e))
        })?;
        Self::init_schema(&conn)?;

        info!("Capture storage opened at {:?}", path);

        Ok(Self {
            path,
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory SQLite database, mostly for tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            path: PathBuf::from(":memory:"),
            db: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
            [],
        )
        .map_err(|e| EngineError::StorageFailed(format!("Schema creation failed: {}", e)))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl KeyValueStorage for SqliteStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let db = self.db.lock().await;
        let raw: Option<String> = db
            .query_row("SELECT value FROM kv WHERE key = ?", params![key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| EngineError::StorageFailed(format!("Read of {} failed: {}", key, e)))?;
        drop(db);

        match raw {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let text = serde_json::to_string(&value)?;
        let db = self.db.lock().await;
        db.execute(
            r#"
            INSERT INTO kv (key, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
            params![key, text, chrono::Utc::now().timestamp()],
        )
        .map_err(|e| EngineError::StorageFailed(format!("Write of {} failed: {}", key, e)))?;

        debug!("Persisted {} ({} bytes)", key, text.len());
        Ok(())
    }
}

/// In-memory storage
#[derive(Default)]
pub struct MemoryStorage {
    blobs: parking_lot::Mutex<HashMap<String, Value>>,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail, to exercise best-effort persistence
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Insert a raw blob bypassing the trait, e.g. a corrupt value
    pub fn insert_raw(&self, key: &str, value: Value) {
        self.blobs.lock().insert(key.to_string(), value);
    }

    pub fn raw(&self, key: &str) -> Option<Value> {
        self.blobs.lock().get(key).cloned()
    }
}

#[async_trait]
impl KeyValueStorage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.blobs.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(EngineError::StorageFailed(format!(
                "Write of {} rejected",
                key
            )));
        }
        self.blobs.lock().insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_sqlite_roundtrip() {
        let dir = tempdir().unwrap();
        let storage = SqliteStorage::open(dir.path().join("nested").join("store.db")).unwrap();

        assert!(storage.get(keys::LOGS).await.unwrap().is_none());

        storage.set(keys::RECORDING, json!(true)).await.unwrap();
        storage.set(keys::RECORDING, json!(false)).await.unwrap();
        assert_eq!(storage.get(keys::RECORDING).await.unwrap(), Some(json!(false)));
    }

    #[tokio::test]
    async fn test_sqlite_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.db");

        {
            let storage = SqliteStorage::open(&path).unwrap();
            storage
                .set_many(vec![
                    (keys::PAUSED, json!(true)),
                    (keys::LOGS, json!([{"apiType": "fetch", "url": "https://a"}])),
                ])
                .await
                .unwrap();
        }

        let storage = SqliteStorage::open(&path).unwrap();
        assert_eq!(storage.get(keys::PAUSED).await.unwrap(), Some(json!(true)));
        let logs = storage.get(keys::LOGS).await.unwrap().unwrap();
        assert_eq!(logs[0]["url"], "https://a");
    }

    #[tokio::test]
    async fn test_sqlite_corrupt_value_is_an_error() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        {
            let db = storage.db.lock().await;
            db.execute(
                "INSERT INTO kv (key, value, updated_at) VALUES ('logs', '{not json', 0)",
                [],
            )
            .unwrap();
        }
        assert!(storage.get(keys::LOGS).await.is_err());
    }

    #[tokio::test]
    async fn test_memory_write_failures() {
        let storage = MemoryStorage::new();
        storage.set(keys::PAUSED, json!(false)).await.unwrap();

        storage.set_fail_writes(true);
        assert!(storage.set(keys::PAUSED, json!(true)).await.is_err());
        assert_eq!(storage.raw(keys::PAUSED), Some(json!(false)));
    }
}
