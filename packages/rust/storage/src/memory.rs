//! In-process key-value store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use tabdivider_shared::Result;
use tokio::sync::RwLock;

use crate::KeyValueStore;

/// Key-value store held in memory. Every viewer sharing the same
/// `Arc<MemoryStore>` sees the same state.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a fixed set of entries.
    pub fn with_entries<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self {
            entries: RwLock::new(entries.into_iter().map(|(k, v)| (k.into(), v)).collect()),
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn get_all(&self) -> Result<BTreeMap<String, Value>> {
        Ok(self.entries.read().await.clone())
    }
}
