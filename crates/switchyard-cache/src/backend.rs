//! Cache stores.
//!
//! The page cache talks to its store through the [`CacheBackend`] trait: an
//! opaque key/value store with per-entry lifetimes. Two stores ship with the
//! crate:
//!
//! - [`InMemoryCache`] - process-local store; stores configured with the same
//!   location share their data
//! - [`DummyCache`] - accepts writes and never returns anything
//!
//! Stores are configured by alias in [`Settings::caches`] and built with
//! [`get_cache`].
//!
//! ```
//! use std::time::Duration;
//! use switchyard_cache::backend::{CacheBackend, CacheValue, InMemoryCache};
//!
//! # tokio_test_block_on(async {
//! let cache = InMemoryCache::new();
//! cache.set("greeting", CacheValue::String("hello".into()), Some(Duration::from_secs(60))).await.unwrap();
//! assert_eq!(cache.get("greeting").await.unwrap(), Some(CacheValue::String("hello".into())));
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Runtime::new().unwrap().block_on(f)
//! # }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use tokio::sync::RwLock;
use tokio::time::Instant;

use switchyard_core::settings::CacheSettings;
use switchyard_core::{Settings, SwitchyardError, SwitchyardResult};

use crate::response::CachedResponse;

/// The alias used when none is configured.
pub const DEFAULT_CACHE_ALIAS: &str = "default";

const LOCMEM_BACKEND: &str = "switchyard.cache.backends.locmem";
const DUMMY_BACKEND: &str = "switchyard.cache.backends.dummy";

const MAX_KEY_LENGTH: usize = 250;
const DEFAULT_CULL_FREQUENCY: usize = 3;

/// A value that can be stored in a cache backend.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    /// A string value.
    String(String),
    /// A 64-bit integer value.
    Integer(i64),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// A JSON value.
    Json(serde_json::Value),
    /// A page snapshot. Clones share the snapshot.
    Response(Arc<CachedResponse>),
}

impl CacheValue {
    /// Returns the value as a string, if it is a `String` variant.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as an i64, if it is an `Integer` variant.
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the page snapshot, if this is a `Response` variant.
    pub fn as_response(&self) -> Option<&Arc<CachedResponse>> {
        match self {
            Self::Response(r) => Some(r),
            _ => None,
        }
    }
}

/// A store for cached values.
///
/// Keys are opaque strings. A `timeout` of `None` means the store's default
/// lifetime; `Some(Duration::ZERO)` stores an entry that is already expired.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Retrieves a value. Missing and expired keys yield `None`.
    async fn get(&self, key: &str) -> SwitchyardResult<Option<CacheValue>>;

    /// Stores a value.
    async fn set(&self, key: &str, value: CacheValue, timeout: Option<Duration>) -> SwitchyardResult<()>;

    /// Deletes a value, returning `true` if the key existed.
    async fn delete(&self, key: &str) -> SwitchyardResult<bool>;

    /// Removes all entries.
    async fn clear(&self) -> SwitchyardResult<()>;

    /// Retrieves the values for every key that is present.
    async fn get_many(&self, keys: &[&str]) -> SwitchyardResult<HashMap<String, CacheValue>> {
        let mut found = HashMap::new();
        for key in keys {
            if let Some(value) = self.get(key).await? {
                found.insert((*key).to_string(), value);
            }
        }
        Ok(found)
    }

    /// Checks whether a live entry exists for `key`.
    async fn has_key(&self, key: &str) -> SwitchyardResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Adds `delta` to an integer value and returns the result.
    async fn incr(&self, key: &str, delta: i64) -> SwitchyardResult<i64> {
        let value = self
            .get(key)
            .await?
            .ok_or_else(|| SwitchyardError::NotFound(format!("Key '{key}' not found")))?;
        let Some(current) = value.as_integer() else {
            return Err(SwitchyardError::BadRequest(format!(
                "Key '{key}' is not an integer"
            )));
        };
        let updated = current + delta;
        self.set(key, CacheValue::Integer(updated), None).await?;
        Ok(updated)
    }
}

/// Builds the stored form of `key`: `prefix:version:key`.
pub fn make_key(key_prefix: &str, version: u32, key: &str) -> String {
    format!("{key_prefix}:{version}:{key}")
}

/// Warns about keys that other stores would reject.
fn validate_key(key: &str) {
    if key.len() > MAX_KEY_LENGTH {
        tracing::warn!(
            key,
            "Cache key will cause errors if used with memcached ({} > {MAX_KEY_LENGTH})",
            key.len()
        );
    }
    if key.chars().any(|c| c.is_control() || c == ' ') {
        tracing::warn!(key, "Cache key contains characters that will cause errors if used with memcached");
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CacheValue,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

type Store = Arc<RwLock<HashMap<String, CacheEntry>>>;

static LOCMEM_STORES: Lazy<Mutex<HashMap<String, Store>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// A thread-safe in-memory cache with per-entry lifetimes.
///
/// Expired entries are dropped when read and when the store fills up. Once
/// `max_entries` is reached a write first drops expired entries and then,
/// if the store is still full, every third key.
#[derive(Debug, Clone)]
pub struct InMemoryCache {
    store: Store,
    key_prefix: String,
    version: u32,
    default_timeout: Duration,
    max_entries: usize,
    cull_frequency: usize,
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCache {
    /// A private store with the default configuration.
    pub fn new() -> Self {
        Self::with_store(Arc::default(), &CacheSettings::default())
    }

    /// A store configured by `settings`, sharing its data with every other
    /// in-memory store at the same location.
    pub fn from_settings(settings: &CacheSettings) -> Self {
        let store = Arc::clone(
            LOCMEM_STORES
                .lock()
                .expect("locmem store registry lock poisoned")
                .entry(settings.location.clone())
                .or_default(),
        );
        Self::with_store(store, settings)
    }

    fn with_store(store: Store, settings: &CacheSettings) -> Self {
        Self {
            store,
            key_prefix: settings.key_prefix.clone(),
            version: settings.version,
            default_timeout: Duration::from_secs(settings.timeout),
            max_entries: settings.max_entries,
            cull_frequency: DEFAULT_CULL_FREQUENCY,
        }
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    /// Whether the store holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.store.read().await.is_empty()
    }

    fn key(&self, key: &str) -> String {
        let key = make_key(&self.key_prefix, self.version, key);
        validate_key(&key);
        key
    }

    fn cull(&self, store: &mut HashMap<String, CacheEntry>) {
        let now = Instant::now();
        store.retain(|_, entry| !entry.is_expired_at(now));
        if store.len() < self.max_entries {
            return;
        }
        if self.cull_frequency == 0 {
            store.clear();
            return;
        }
        let doomed: Vec<String> = store.keys().step_by(self.cull_frequency).cloned().collect();
        tracing::debug!(culled = doomed.len(), "Culling in-memory cache");
        for key in doomed {
            store.remove(&key);
        }
    }
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> SwitchyardResult<Option<CacheValue>> {
        let key = self.key(key);
        {
            let store = self.store.read().await;
            match store.get(&key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired_at(Instant::now()) => {
                    return Ok(Some(entry.value.clone()));
                }
                Some(_) => {}
            }
        }
        let mut store = self.store.write().await;
        if store.get(&key).is_some_and(|e| e.is_expired_at(Instant::now())) {
            store.remove(&key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: CacheValue, timeout: Option<Duration>) -> SwitchyardResult<()> {
        let key = self.key(key);
        let expires_at = Instant::now() + timeout.unwrap_or(self.default_timeout);
        let mut store = self.store.write().await;
        if store.len() >= self.max_entries && !store.contains_key(&key) {
            self.cull(&mut store);
        }
        store.insert(key, CacheEntry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> SwitchyardResult<bool> {
        let key = self.key(key);
        Ok(self.store.write().await.remove(&key).is_some())
    }

    async fn clear(&self) -> SwitchyardResult<()> {
        self.store.write().await.clear();
        Ok(())
    }
}

/// A store that never keeps anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DummyCache;

#[async_trait]
impl CacheBackend for DummyCache {
    async fn get(&self, key: &str) -> SwitchyardResult<Option<CacheValue>> {
        validate_key(key);
        Ok(None)
    }

    async fn set(&self, key: &str, _value: CacheValue, _timeout: Option<Duration>) -> SwitchyardResult<()> {
        validate_key(key);
        Ok(())
    }

    async fn delete(&self, key: &str) -> SwitchyardResult<bool> {
        validate_key(key);
        Ok(false)
    }

    async fn clear(&self) -> SwitchyardResult<()> {
        Ok(())
    }
}

/// Builds the store described by `settings`.
pub fn create_cache(settings: &CacheSettings) -> SwitchyardResult<Arc<dyn CacheBackend>> {
    match settings.backend.as_str() {
        LOCMEM_BACKEND => Ok(Arc::new(InMemoryCache::from_settings(settings))),
        DUMMY_BACKEND => Ok(Arc::new(DummyCache)),
        other => Err(SwitchyardError::ImproperlyConfigured(format!(
            "Could not find backend '{other}'"
        ))),
    }
}

/// Builds the store configured under `alias`.
pub fn get_cache(alias: &str, settings: &Settings) -> SwitchyardResult<Arc<dyn CacheBackend>> {
    let config = settings.caches.get(alias).ok_or_else(|| {
        SwitchyardError::ImproperlyConfigured(format!(
            "Could not find config for '{alias}' in the caches setting"
        ))
    })?;
    create_cache(config)
}
