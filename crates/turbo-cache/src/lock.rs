//! Cooperative write lock shared by all writers of one store.

use std::sync::atomic::{AtomicBool, Ordering};

/// Write lock of a cache store.
///
/// A lock is *held* while some process rebuilds or clears the cache. Writes
/// are refused while the lock is held and enabled. `disable` lets one writer
/// bypass a held lock without releasing it for anybody else.
#[derive(Debug)]
pub struct WriteLock {
    held: AtomicBool,
    enabled: AtomicBool,
}

impl Default for WriteLock {
    fn default() -> Self {
        Self {
            held: AtomicBool::new(false),
            enabled: AtomicBool::new(true),
        }
    }
}

impl WriteLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock. Returns `false` when it was already held.
    pub fn acquire(&self) -> bool {
        !self.held.swap(true, Ordering::SeqCst)
    }

    pub fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
    }

    /// Whether the lock is currently held and enforced.
    pub fn has_lock(&self) -> bool {
        self.held.load(Ordering::SeqCst) && self.enabled.load(Ordering::SeqCst)
    }

    /// Stop enforcing a held lock.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    /// Resume enforcing the lock.
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}
