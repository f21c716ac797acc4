//! Key-value persistence for dividers.
//!
//! [`KeyValueStore`] is the raw contract: JSON values under string keys,
//! each call atomic for its own key and never across keys. Two backends:
//!
//! - [`MemoryStore`]: in-process map, shared between viewers of one process
//! - [`SqlStore`]: Turso Embedded / libSQL database used by the CLI
//!
//! [`TypedStore`] sits on top and gives every key family its value shape.

mod memory;
mod migrations;
mod typed;

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database, params};
use serde_json::Value;
use tabdivider_shared::{DividerError, Result};

pub use memory::MemoryStore;
pub use typed::{
    KeyFamily, OptionsOf, PagesOf, REGISTRY_KEY, Registry, StoreAudit, StoreKey, TypedStore,
};

/// Asynchronous key-value contract the divider core persists through.
///
/// There is no multi-key transaction and no compare-and-swap: callers that
/// touch several keys issue independent writes.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read one key. `None` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Write one key, replacing any previous value.
    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Delete one key. Absent keys are ignored.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Every key with its value.
    async fn get_all(&self) -> Result<BTreeMap<String, Value>>;
}

/// libSQL-backed store.
///
/// **Access rules:**
/// - CLI commands that mutate: read-write via [`SqlStore::open`]
/// - Listing / exporting: read-only via [`SqlStore::open_readonly`]
pub struct SqlStore {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl SqlStore {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DividerError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DividerError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| DividerError::Storage(e.to_string()))?;

        let store = Self {
            db,
            conn,
            readonly: false,
        };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DividerError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| DividerError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    DividerError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(DividerError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for SqlStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM entries WHERE key = ?1", params![key])
            .await
            .map_err(|e| DividerError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let raw: String = row
                    .get(0)
                    .map_err(|e| DividerError::Storage(e.to_string()))?;
                Ok(Some(decode(key, &raw)?))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DividerError::Storage(e.to_string())),
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.check_writable()?;
        let raw = serde_json::to_string(&value)
            .map_err(|e| DividerError::Storage(format!("encode `{key}`: {e}")))?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO entries (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                   value = excluded.value,
                   updated_at = excluded.updated_at",
                params![key, raw.as_str(), now.as_str()],
            )
            .await
            .map_err(|e| DividerError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute("DELETE FROM entries WHERE key = ?1", params![key])
            .await
            .map_err(|e| DividerError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn get_all(&self) -> Result<BTreeMap<String, Value>> {
        let mut rows = self
            .conn
            .query("SELECT key, value FROM entries ORDER BY key", params![])
            .await
            .map_err(|e| DividerError::Storage(e.to_string()))?;

        let mut results = BTreeMap::new();
        while let Ok(Some(row)) = rows.next().await {
            let key: String = row
                .get(0)
                .map_err(|e| DividerError::Storage(e.to_string()))?;
            let raw: String = row
                .get(1)
                .map_err(|e| DividerError::Storage(e.to_string()))?;
            let value = decode(&key, &raw)?;
            results.insert(key, value);
        }
        Ok(results)
    }
}

/// Parse a stored JSON document.
fn decode(key: &str, raw: &str) -> Result<Value> {
    serde_json::from_str(raw)
        .map_err(|e| DividerError::Storage(format!("corrupt value at `{key}`: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    /// Create a temp file store for testing.
    async fn test_store() -> SqlStore {
        let tmp = std::env::temp_dir().join(format!("td_test_{}.db", Uuid::now_v7()));
        SqlStore::open(&tmp).await.expect("open test db")
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let store = test_store().await;
        let version = store.get_schema_version().await;
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("td_test_{}.db", Uuid::now_v7()));
        let _s1 = SqlStore::open(&tmp).await.expect("first open");
        drop(_s1);
        let s2 = SqlStore::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn entry_crud() {
        let store = test_store().await;

        assert!(store.get("dividers").await.expect("get miss").is_none());

        store
            .set("dividers", json!(["Work", "Later"]))
            .await
            .expect("set");
        let found = store.get("dividers").await.expect("get hit");
        assert_eq!(found, Some(json!(["Work", "Later"])));

        // Overwrite
        store.set("dividers", json!(["Later"])).await.expect("set again");
        let found = store.get("dividers").await.unwrap().unwrap();
        assert_eq!(found, json!(["Later"]));

        store.remove("dividers").await.expect("remove");
        assert!(store.get("dividers").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_all_returns_every_entry() {
        let store = test_store().await;
        store.set("dividers", json!(["A"])).await.unwrap();
        store
            .set(
                "dividers.A.pages",
                json!([{"title": "t", "url": "https://example.com", "time": 1}]),
            )
            .await
            .unwrap();
        store.set("dividers.A.options", json!({})).await.unwrap();

        let all = store.get_all().await.expect("get all");
        assert_eq!(all.len(), 3);
        assert_eq!(all["dividers"], json!(["A"]));
        assert_eq!(all["dividers.A.pages"][0]["url"], "https://example.com");
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("td_test_{}.db", Uuid::now_v7()));
        let rw = SqlStore::open(&tmp).await.unwrap();
        rw.set("dividers", json!(["A"])).await.unwrap();
        drop(rw);

        let ro = SqlStore::open_readonly(&tmp).await.unwrap();
        assert_eq!(ro.get("dividers").await.unwrap(), Some(json!(["A"])));

        let result = ro.set("dividers", json!(["B"])).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));

        let result = ro.remove("dividers").await;
        assert!(result.is_err());
    }
}
