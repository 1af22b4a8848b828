//! In-process store.

use dashmap::DashMap;

use crate::{CacheError, KvStore, WriteLock};

#[derive(Debug, Clone)]
struct Entry {
    bytes: Vec<u8>,
    tags: Vec<String>,
}

/// Concurrent in-memory [`KvStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    lock: WriteLock,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.entries.get(key).map(|e| e.bytes.clone()))
    }

    fn set(&self, key: &str, value: Vec<u8>, tags: &[String]) -> Result<(), CacheError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                bytes: value,
                tags: tags.to_vec(),
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.contains_key(key))
    }

    fn keys(&self) -> Result<Vec<String>, CacheError> {
        Ok(self.entries.iter().map(|e| e.key().clone()).collect())
    }

    fn clear_tag(&self, tag: &str) -> Result<usize, CacheError> {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.tags.iter().any(|t| t == tag));
        Ok(before.saturating_sub(self.entries.len()))
    }

    fn write_lock(&self) -> &WriteLock {
        &self.lock
    }
}
