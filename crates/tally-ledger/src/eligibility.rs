//! Category eligibility cache.
//!
//! Maps category id to "voting enabled". Built lazily on the first query by
//! scanning category configuration, dropped wholesale by [`invalidate`]
//! whenever a category is saved. There is no partial update.
//!
//! A rebuild that races an invalidation is discarded rather than stored,
//! so the cache never outlives the configuration it was built from.
//!
//! [`invalidate`]: EligibilityCache::invalidate

use crate::error::Result;
use crate::ids::CategoryId;
use crate::store::VoteStore;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default)]
pub struct EligibilityCache {
    allowed: RwLock<Option<Arc<HashSet<CategoryId>>>>,
    generation: AtomicU64,
}

impl EligibilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `category` has voting enabled.
    pub fn allows<S: VoteStore + ?Sized>(&self, store: &S, category: CategoryId) -> Result<bool> {
        Ok(self.allowed(store)?.contains(&category))
    }

    /// The current allowed set, rebuilding if it was invalidated.
    pub fn allowed<S: VoteStore + ?Sized>(&self, store: &S) -> Result<Arc<HashSet<CategoryId>>> {
        if let Some(set) = self.allowed.read().as_ref() {
            return Ok(Arc::clone(set));
        }
        self.rebuild(store)
    }

    /// Scan category configuration and replace the cached set.
    pub fn rebuild<S: VoteStore + ?Sized>(&self, store: &S) -> Result<Arc<HashSet<CategoryId>>> {
        let generation = self.generation.load(Ordering::Acquire);
        let set: HashSet<CategoryId> = store
            .categories()?
            .into_iter()
            .filter(|c| c.voting_enabled)
            .map(|c| c.id)
            .collect();
        let set = Arc::new(set);

        let mut cached = self.allowed.write();
        if self.generation.load(Ordering::Acquire) == generation {
            *cached = Some(Arc::clone(&set));
            debug!(categories = set.len(), "Eligibility cache rebuilt");
        }
        Ok(set)
    }

    /// Drop the cached set. Call after any category configuration change.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        *self.allowed.write() = None;
        debug!("Eligibility cache invalidated");
    }

    /// True if a set is currently cached.
    pub fn is_warm(&self) -> bool {
        self.allowed.read().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;
    use crate::store::MemoryStore;

    fn category(id: u64, enabled: bool) -> Category {
        let mut c = Category::new(CategoryId::new(id).unwrap(), format!("c{}", id));
        c.voting_enabled = enabled;
        c
    }

    #[test]
    fn lazy_build_on_first_query() {
        let store = MemoryStore::new();
        store.put_category(&category(1, true)).unwrap();
        store.put_category(&category(2, false)).unwrap();

        let cache = EligibilityCache::new();
        assert!(!cache.is_warm());
        assert!(cache.allows(&store, CategoryId::new(1).unwrap()).unwrap());
        assert!(!cache.allows(&store, CategoryId::new(2).unwrap()).unwrap());
        assert!(cache.is_warm());
    }

    #[test]
    fn stale_until_invalidated() {
        let store = MemoryStore::new();
        store.put_category(&category(1, false)).unwrap();
        let cache = EligibilityCache::new();
        let id = CategoryId::new(1).unwrap();

        assert!(!cache.allows(&store, id).unwrap());
        store.put_category(&category(1, true)).unwrap();
        assert!(!cache.allows(&store, id).unwrap());

        cache.invalidate();
        assert!(cache.allows(&store, id).unwrap());
    }

    #[test]
    fn unknown_category_not_allowed() {
        let store = MemoryStore::new();
        let cache = EligibilityCache::new();
        assert!(!cache.allows(&store, CategoryId::new(99).unwrap()).unwrap());
    }
}
