//! Striped point locks.
//!
//! Serializes work per key (one voter record, one topic count) without a
//! map of per-key mutexes. Unrelated keys may share a stripe; that only
//! costs contention. Callers never hold two guards from the same set.

use parking_lot::{Mutex, MutexGuard};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Default stripe count.
pub const DEFAULT_STRIPES: usize = 64;

#[derive(Debug)]
pub struct StripedLocks {
    stripes: Vec<Mutex<()>>,
}

impl Default for StripedLocks {
    fn default() -> Self {
        Self::new(DEFAULT_STRIPES)
    }
}

impl StripedLocks {
    pub fn new(stripes: usize) -> Self {
        Self {
            stripes: (0..stripes.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    fn stripe_of<K: Hash>(&self, key: &K) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.stripes.len() as u64) as usize
    }

    /// Lock the stripe owning `key`.
    pub fn lock<K: Hash>(&self, key: &K) -> MutexGuard<'_, ()> {
        self.stripes[self.stripe_of(key)].lock()
    }
}
