//! Converted-geometry cache shared by packed primitives.
//!
//! Keyed by [`InstanceKey`], so instances of one master share a single
//! geometry term.
//!
//! Uses `parking_lot::RwLock` for faster, non-poisoning locks
//! and atomics for lock-free statistics.

use super::instance_key::InstanceKey;
use crate::unpack::GeomTerm;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Thread-safe cache of converted geometry terms.
pub struct GeometryCache {
    /// Cache storage.
    cache: RwLock<HashMap<InstanceKey, Arc<GeomTerm>>>,
    /// Maximum number of entries.
    max_entries: usize,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl GeometryCache {
    /// Default capacity in entries.
    pub const DEFAULT_CAPACITY: usize = 4096;

    /// Create a new cache holding at most `max_entries` terms.
    pub fn new(max_entries: usize) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            max_entries,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// Get a cached term if it exists.
    #[inline]
    pub fn get(&self, key: &InstanceKey) -> Option<Arc<GeomTerm>> {
        let found = self.cache.read().get(key).cloned();
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// Get the term for `key`, building it with `build` on a miss.
    ///
    /// `build` runs outside the lock; `None` results are not cached.
    pub fn get_or_insert_with(
        &self,
        key: &InstanceKey,
        build: impl FnOnce() -> Option<GeomTerm>,
    ) -> Option<Arc<GeomTerm>> {
        if let Some(term) = self.get(key) {
            return Some(term);
        }
        let term = build()?;
        Some(self.insert(key.clone(), term))
    }

    /// Insert a term; an existing entry for the key wins.
    pub fn insert(&self, key: InstanceKey, term: GeomTerm) -> Arc<GeomTerm> {
        if self.max_entries == 0 {
            return Arc::new(term);
        }
        if self.len() >= self.max_entries {
            self.evict_some();
        }
        let mut cache = self.cache.write();
        Arc::clone(cache.entry(key).or_insert_with(|| Arc::new(term)))
    }

    /// Evict approximately half of the cache.
    fn evict_some(&self) {
        let mut cache = self.cache.write();
        let keys: Vec<_> = cache.keys().cloned().collect();
        let evict_count = keys.len().div_ceil(2);
        for key in keys.into_iter().take(evict_count) {
            cache.remove(&key);
        }
        tracing::debug!(evicted = evict_count, "geometry cache eviction");
    }

    /// Clear the entire cache.
    pub fn clear(&self) {
        self.cache.write().clear();
    }

    /// Get the number of cached entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    /// Check if cache is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn hit_count(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn miss_count(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }
}

impl Default for GeometryCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
