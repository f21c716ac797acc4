//! Typed access to the persisted key layout.
//!
//! | Key                       | Family        | Value               |
//! |---------------------------|---------------|---------------------|
//! | `dividers`                | [`Registry`]  | `Vec<String>`       |
//! | `dividers.<name>.pages`   | [`PagesOf`]   | `Vec<Page>`         |
//! | `dividers.<name>.options` | [`OptionsOf`] | [`DividerOptions`]  |
//!
//! Values are checked on the way out: anything that does not deserialize
//! into its family's shape is a [`DividerError::Validation`] naming the key.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tabdivider_shared::{DividerError, DividerOptions, Page, Result};

use crate::KeyValueStore;

/// The fixed key holding the ordered list of divider names.
pub const REGISTRY_KEY: &str = "dividers";

const KEY_PREFIX: &str = "dividers.";
const PAGES_SUFFIX: &str = ".pages";
const OPTIONS_SUFFIX: &str = ".options";

// ---------------------------------------------------------------------------
// Key families
// ---------------------------------------------------------------------------

/// A family of keys sharing one value shape.
pub trait KeyFamily {
    /// Shape of every value stored under this family.
    type Value: Serialize + DeserializeOwned + Send + Sync;

    /// Concrete key for this member of the family.
    fn key(&self) -> String;
}

/// The divider registry.
#[derive(Debug, Clone, Copy)]
pub struct Registry;

impl KeyFamily for Registry {
    type Value = Vec<String>;

    fn key(&self) -> String {
        REGISTRY_KEY.to_string()
    }
}

/// Page sequence of one divider.
#[derive(Debug, Clone, Copy)]
pub struct PagesOf<'a>(pub &'a str);

impl KeyFamily for PagesOf<'_> {
    type Value = Vec<Page>;

    fn key(&self) -> String {
        format!("{KEY_PREFIX}{}{PAGES_SUFFIX}", self.0)
    }
}

/// Reserved options value of one divider.
#[derive(Debug, Clone, Copy)]
pub struct OptionsOf<'a>(pub &'a str);

impl KeyFamily for OptionsOf<'_> {
    type Value = DividerOptions;

    fn key(&self) -> String {
        format!("{KEY_PREFIX}{}{OPTIONS_SUFFIX}", self.0)
    }
}

/// A raw key classified into its family.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StoreKey {
    Registry,
    Pages(String),
    Options(String),
}

impl StoreKey {
    /// Classify a raw key. Keys outside the divider layout return `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw == REGISTRY_KEY {
            return Some(Self::Registry);
        }
        let rest = raw.strip_prefix(KEY_PREFIX)?;
        if let Some(name) = rest.strip_suffix(PAGES_SUFFIX) {
            return Some(Self::Pages(name.to_string()));
        }
        rest.strip_suffix(OPTIONS_SUFFIX)
            .map(|name| Self::Options(name.to_string()))
    }

    /// The raw key string.
    pub fn as_key(&self) -> String {
        match self {
            Self::Registry => Registry.key(),
            Self::Pages(name) => PagesOf(name).key(),
            Self::Options(name) => OptionsOf(name).key(),
        }
    }

    /// Divider this key belongs to, if any.
    pub fn divider(&self) -> Option<&str> {
        match self {
            Self::Registry => None,
            Self::Pages(name) | Self::Options(name) => Some(name),
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_key())
    }
}

// ---------------------------------------------------------------------------
// TypedStore
// ---------------------------------------------------------------------------

/// Shape-checked view over a [`KeyValueStore`]. Cheap to clone.
#[derive(Clone)]
pub struct TypedStore {
    inner: Arc<dyn KeyValueStore>,
}

impl TypedStore {
    pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
        Self { inner }
    }

    /// The underlying raw store.
    pub fn raw(&self) -> &Arc<dyn KeyValueStore> {
        &self.inner
    }

    /// Read and validate one key.
    pub async fn get<K: KeyFamily + Sync>(&self, family: &K) -> Result<Option<K::Value>> {
        let key = family.key();
        match self.inner.get(&key).await? {
            Some(value) => serde_json::from_value(value).map(Some).map_err(|e| {
                DividerError::validation(format!("value at `{key}` has the wrong shape: {e}"))
            }),
            None => Ok(None),
        }
    }

    /// Serialize and write one key.
    pub async fn set<K: KeyFamily + Sync>(&self, family: &K, value: &K::Value) -> Result<()> {
        let key = family.key();
        let json = serde_json::to_value(value)
            .map_err(|e| DividerError::Storage(format!("encode `{key}`: {e}")))?;
        self.inner.set(&key, json).await
    }

    /// Delete one key.
    pub async fn remove<K: KeyFamily + Sync>(&self, family: &K) -> Result<()> {
        self.inner.remove(&family.key()).await
    }

    /// The registry, empty when it has never been written.
    pub async fn registry(&self) -> Result<Vec<String>> {
        Ok(self.get(&Registry).await?.unwrap_or_default())
    }

    /// Every persisted key with its raw value.
    pub async fn snapshot(&self) -> Result<BTreeMap<String, Value>> {
        self.inner.get_all().await
    }

    /// Compare the registry with the per-divider keys actually present.
    pub async fn audit(&self) -> Result<StoreAudit> {
        let registry = self.registry().await?;
        let snapshot = self.snapshot().await?;

        let mut seen = BTreeSet::new();
        let duplicate_names = registry
            .iter()
            .filter(|name| !seen.insert(name.as_str()))
            .cloned()
            .collect();

        let registered: BTreeSet<&str> = registry.iter().map(String::as_str).collect();
        let mut with_pages = BTreeSet::new();
        let mut orphaned_keys = Vec::new();

        for raw in snapshot.keys() {
            let Some(key) = StoreKey::parse(raw) else {
                continue;
            };
            if let StoreKey::Pages(name) = &key {
                with_pages.insert(name.clone());
            }
            if let Some(name) = key.divider() {
                if !registered.contains(name) {
                    orphaned_keys.push(raw.clone());
                }
            }
        }

        let missing_pages = registry
            .iter()
            .filter(|name| !with_pages.contains(name.as_str()))
            .cloned()
            .collect();

        Ok(StoreAudit {
            duplicate_names,
            orphaned_keys,
            missing_pages,
        })
    }
}

/// Result of [`TypedStore::audit`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreAudit {
    /// Names registered more than once (each extra occurrence listed).
    pub duplicate_names: Vec<String>,
    /// Page/option keys whose divider is not registered.
    pub orphaned_keys: Vec<String>,
    /// Registered names without a page-sequence key.
    pub missing_pages: Vec<String>,
}

impl StoreAudit {
    pub fn is_clean(&self) -> bool {
        self.duplicate_names.is_empty()
            && self.orphaned_keys.is_empty()
            && self.missing_pages.is_empty()
    }
}
