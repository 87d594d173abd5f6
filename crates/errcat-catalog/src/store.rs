//! Durable key-value store for the catalog snapshot.
//!
//! A scoped `get`/`set`/`delete` layer over a versioned SQLite database.
//! Queries run on the blocking pool so callers can await them from async code.
//!
//! A [`KvStore::disabled`] store turns every operation into a successful
//! no-op, which lets the cache run unchanged where no database is available.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};

/// Schema version recorded in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 1;

const KV_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    scope       TEXT NOT NULL,
    key         TEXT NOT NULL,
    value       TEXT NOT NULL,
    updated_at  TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope, key)
);
"#;

/// Scoped key-value store.
#[derive(Clone)]
pub struct KvStore {
    conn: Option<Arc<Mutex<Connection>>>,
    scope: Arc<str>,
}

impl std::fmt::Debug for KvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvStore")
            .field("scope", &self.scope)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl KvStore {
    /// Open a file-backed store, creating the parent directory if needed.
    pub fn open(path: &Path, scope: &str) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Io {
                    message: format!("failed to create {}: {}", parent.display(), e),
                })?;
            }
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn, scope)
    }

    /// Open a file-backed store, degrading to [`KvStore::disabled`] on failure.
    pub fn open_or_disabled(path: &Path, scope: &str) -> Self {
        match Self::open(path, scope) {
            Ok(store) => store,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "durable store unavailable, continuing without persistence");
                Self::disabled()
            }
        }
    }

    /// Create an in-memory store (for testing).
    pub fn memory(scope: &str) -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?, scope)
    }

    /// Wrap an existing connection.
    pub fn from_connection(conn: Connection, scope: &str) -> StoreResult<Self> {
        init_connection(&conn)?;
        Ok(Self {
            conn: Some(Arc::new(Mutex::new(conn))),
            scope: Arc::from(scope),
        })
    }

    /// A store with no backing database.
    pub fn disabled() -> Self {
        Self {
            conn: None,
            scope: Arc::from(""),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.conn.is_some()
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Read and decode a value. Missing keys resolve to `None`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        let Some(raw) = self.get_raw(key).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StoreError::Decode {
                key: key.to_string(),
                message: e.to_string(),
            })
    }

    /// Encode and write a value, replacing any previous one.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StoreResult<()> {
        let raw = serde_json::to_string(value).map_err(|e| StoreError::Encode {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        self.set_raw(key, raw).await
    }

    /// Remove a value. Deleting a missing key succeeds.
    pub async fn delete(&self, key: &str) -> StoreResult<()> {
        let key = key.to_string();
        let removed = self
            .with_conn(move |conn, scope| {
                Ok(conn.execute(
                    "DELETE FROM kv WHERE scope = ?1 AND key = ?2",
                    params![scope, key],
                )?)
            })
            .await?;
        if let Some(n) = removed {
            debug!(scope = %self.scope, rows = n, "store delete");
        }
        Ok(())
    }

    /// Remove `keys` only while `guard` still holds `expected`.
    ///
    /// Check and delete run in one transaction. Returns whether the keys were
    /// removed; a disabled store removes nothing.
    pub async fn delete_if_unchanged<T: Serialize + ?Sized>(
        &self,
        guard: &str,
        expected: &T,
        keys: &[&str],
    ) -> StoreResult<bool> {
        let expected = serde_json::to_string(expected).map_err(|e| StoreError::Encode {
            key: guard.to_string(),
            message: e.to_string(),
        })?;
        let guard = guard.to_string();
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();

        let deleted = self
            .with_conn(move |conn, scope| {
                let tx = conn.unchecked_transaction()?;
                let current = tx
                    .query_row(
                        "SELECT value FROM kv WHERE scope = ?1 AND key = ?2",
                        params![scope, guard],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()?;
                if current.as_deref() != Some(expected.as_str()) {
                    return Ok(false);
                }
                for key in &keys {
                    tx.execute(
                        "DELETE FROM kv WHERE scope = ?1 AND key = ?2",
                        params![scope, key],
                    )?;
                }
                tx.commit()?;
                Ok(true)
            })
            .await?;
        Ok(deleted.unwrap_or(false))
    }

    /// Read the stored JSON text for a key.
    pub async fn get_raw(&self, key: &str) -> StoreResult<Option<String>> {
        let key = key.to_string();
        let value = self
            .with_conn(move |conn, scope| {
                Ok(conn
                    .query_row(
                        "SELECT value FROM kv WHERE scope = ?1 AND key = ?2",
                        params![scope, key],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()?)
            })
            .await?;
        Ok(value.flatten())
    }

    /// Write JSON text for a key as-is.
    pub async fn set_raw(&self, key: &str, raw: String) -> StoreResult<()> {
        let key = key.to_string();
        self.with_conn(move |conn, scope| {
            conn.execute(
                r#"
                INSERT INTO kv (scope, key, value, updated_at)
                VALUES (?1, ?2, ?3, datetime('now'))
                ON CONFLICT(scope, key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
                "#,
                params![scope, key, raw],
            )?;
            Ok(())
        })
        .await?;
        Ok(())
    }

    /// Run `op` on the blocking pool. Returns `None` when the store is disabled.
    async fn with_conn<R, F>(&self, op: F) -> StoreResult<Option<R>>
    where
        R: Send + 'static,
        F: FnOnce(&Connection, &str) -> StoreResult<R> + Send + 'static,
    {
        let Some(conn) = self.conn.clone() else {
            return Ok(None);
        };
        let scope = self.scope.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(|e| e.into_inner());
            op(&*conn, &*scope)
        })
        .await
        .map_err(|e| StoreError::Task {
            message: e.to_string(),
        })?
        .map(Some)
    }
}

fn init_connection(conn: &Connection) -> StoreResult<()> {
    // WAL mode for file-backed DBs (no-op for in-memory)
    let _ = conn.execute_batch("PRAGMA journal_mode = WAL");
    let _ = conn.execute("PRAGMA busy_timeout = 5000", []);

    let found: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if found > SCHEMA_VERSION {
        return Err(StoreError::Version {
            found,
            supported: SCHEMA_VERSION,
        });
    }

    conn.execute_batch(KV_SCHEMA)?;
    if found < SCHEMA_VERSION {
        debug!(from = found, to = SCHEMA_VERSION, "migrating store schema");
        conn.execute_batch(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[tokio::test]
    async fn test_roundtrip_and_overwrite() {
        let store = KvStore::memory("test").unwrap();
        let first = Sample {
            name: "a".into(),
            count: 1,
        };
        store.set("sample", &first).await.unwrap();
        assert_eq!(store.get::<Sample>("sample").await.unwrap(), Some(first));

        let second = Sample {
            name: "b".into(),
            count: 2,
        };
        store.set("sample", &second).await.unwrap();
        assert_eq!(store.get::<Sample>("sample").await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn test_missing_key_is_none() {
        let store = KvStore::memory("test").unwrap();
        assert_eq!(store.get::<Sample>("nope").await.unwrap(), None);
        store.delete("nope").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete() {
        let store = KvStore::memory("test").unwrap();
        store.set("n", &5_i64).await.unwrap();
        store.delete("n").await.unwrap();
        assert_eq!(store.get::<i64>("n").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_if_unchanged() {
        let store = KvStore::memory("test").unwrap();
        store.set("stamp", &2_i64).await.unwrap();
        store.set("body", "payload").await.unwrap();

        // Stamp moved on since it was read: nothing is removed.
        let removed = store
            .delete_if_unchanged("stamp", &1_i64, &["stamp", "body"])
            .await
            .unwrap();
        assert!(!removed);
        assert_eq!(store.get::<i64>("stamp").await.unwrap(), Some(2));
        assert!(store.get_raw("body").await.unwrap().is_some());

        let removed = store
            .delete_if_unchanged("stamp", &2_i64, &["stamp", "body"])
            .await
            .unwrap();
        assert!(removed);
        assert_eq!(store.get::<i64>("stamp").await.unwrap(), None);
        assert_eq!(store.get_raw("body").await.unwrap(), None);

        // Missing guard key.
        assert!(!store
            .delete_if_unchanged("stamp", &2_i64, &["stamp"])
            .await
            .unwrap());
        assert!(!KvStore::disabled()
            .delete_if_unchanged("stamp", &2_i64, &["stamp"])
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_scopes_are_isolated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shared.db");
        let a = KvStore::open(&path, "a").unwrap();
        let b = KvStore::open(&path, "b").unwrap();

        a.set("k", &1_i64).await.unwrap();
        assert_eq!(b.get::<i64>("k").await.unwrap(), None);
        assert_eq!(a.get::<i64>("k").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_disabled_store_is_noop() {
        let store = KvStore::disabled();
        assert!(!store.is_enabled());
        store.set("k", &1_i64).await.unwrap();
        assert_eq!(store.get::<i64>("k").await.unwrap(), None);
        store.delete("k").await.unwrap();
    }

    #[tokio::test]
    async fn test_decode_failure_is_error() {
        let store = KvStore::memory("test").unwrap();
        store.set_raw("n", "not json".to_string()).await.unwrap();
        let err = store.get::<i64>("n").await.unwrap_err();
        assert!(matches!(err, StoreError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("catalog.db");

        KvStore::open(&path, "s")
            .unwrap()
            .set("k", "v")
            .await
            .unwrap();

        let reopened = KvStore::open(&path, "s").unwrap();
        assert_eq!(
            reopened.get::<String>("k").await.unwrap(),
            Some("v".to_string())
        );
    }

    #[test]
    fn test_schema_version_recorded() {
        let conn = Connection::open_in_memory().unwrap();
        init_connection(&conn).unwrap();
        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);

        // idempotent
        init_connection(&conn).unwrap();
    }

    #[test]
    fn test_newer_schema_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA user_version = 99").unwrap();
        let err = KvStore::from_connection(conn, "s").unwrap_err();
        assert!(matches!(
            err,
            StoreError::Version {
                found: 99,
                supported: SCHEMA_VERSION
            }
        ));
    }

    #[test]
    fn test_open_or_disabled_degrades() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();

        let store = KvStore::open_or_disabled(&blocker.join("catalog.db"), "s");
        assert!(!store.is_enabled());
    }
}
