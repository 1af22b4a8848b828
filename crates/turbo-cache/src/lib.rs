//! Tagged key-value cache for TurboCommerce.
//!
//! [`Cache`] stores any `Serialize` value as JSON in a pluggable [`KvStore`].
//! Entries carry tags so a whole family (for example every product mockup of
//! one tenant) can be invalidated at once. Each store owns a [`WriteLock`]:
//! while a lock is held, ordinary writes are refused, and a caller that must
//! write anyway disables the lock around its write.
//!
//! # Example
//!
//! ```rust,ignore
//! use turbo_cache::{cache_key, Cache, MemoryStore};
//!
//! let cache = Cache::new(MemoryStore::new());
//! let key = cache_key!("productindex_mockup", "default", 42);
//!
//! cache.set(&key, &mockup, &["productindex_mockup"])?;
//! let cached: Option<ProductMockup> = cache.get(&key)?;
//! cache.clear_tag("productindex_mockup")?;
//! ```

mod error;
mod kv;
mod lock;
mod memory;

pub use error::CacheError;
pub use kv::{Cache, KvStore};
pub use lock::WriteLock;
pub use memory::MemoryStore;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{cache_key, Cache, CacheError, KvStore, MemoryStore, WriteLock};
}
