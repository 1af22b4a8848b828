//! Store abstraction and the typed cache on top of it.

use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};

use crate::{CacheError, WriteLock};

/// Raw byte store behind a [`Cache`].
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    fn set(&self, key: &str, value: Vec<u8>, tags: &[String]) -> Result<(), CacheError>;

    fn delete(&self, key: &str) -> Result<(), CacheError>;

    fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.get(key)?.is_some())
    }

    fn keys(&self) -> Result<Vec<String>, CacheError>;

    /// Remove every entry carrying `tag`, returning how many were removed.
    fn clear_tag(&self, tag: &str) -> Result<usize, CacheError>;

    /// The lock guarding writes to this store.
    fn write_lock(&self) -> &WriteLock;
}

/// JSON cache over a shared [`KvStore`].
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn KvStore>,
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache").finish_non_exhaustive()
    }
}

impl Cache {
    pub fn new(store: impl KvStore + 'static) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    pub fn from_arc(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Get a value from the cache.
    ///
    /// A stored value that no longer decodes as `T` is treated as a miss.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        match self.store.get(key)? {
            Some(bytes) => match serde_json::from_slice(&bytes) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    tracing::debug!(key, error = %e, "discarding undecodable cache entry");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Store a value under `key`.
    ///
    /// Returns `false` without writing when the store's write lock is held.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, tags: &[&str]) -> Result<bool, CacheError> {
        if self.store.write_lock().has_lock() {
            tracing::debug!(key, "cache write refused, write lock held");
            return Ok(false);
        }
        let bytes = serde_json::to_vec(value)?;
        let tags: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
        self.store.set(key, bytes, &tags)?;
        Ok(true)
    }

    pub fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.store.delete(key)
    }

    pub fn exists(&self, key: &str) -> Result<bool, CacheError> {
        self.store.exists(key)
    }

    pub fn keys(&self) -> Result<Vec<String>, CacheError> {
        self.store.keys()
    }

    pub fn clear_tag(&self, tag: &str) -> Result<usize, CacheError> {
        self.store.clear_tag(tag)
    }

    pub fn write_lock(&self) -> &WriteLock {
        self.store.write_lock()
    }
}

/// Join key parts with `_`, the separator the product index uses.
///
/// ```rust,ignore
/// let key = cache_key!("productindex_mockup", "default", 42);
/// assert_eq!(key, "productindex_mockup_default_42");
/// ```
#[macro_export]
macro_rules! cache_key {
    ($prefix:expr, $($part:expr),+) => {{
        let mut key = String::from($prefix);
        $(
            key.push('_');
            key.push_str(&$part.to_string());
        )+
        key
    }};
}
