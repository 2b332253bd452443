//! Shared state for packing, traversal and unpacking.
//!
//! A [`Context`] bundles the process-wide services an operation needs: the
//! stage cache, the traversal table, the converted-geometry cache and the
//! refiner. Everything is behind an `Arc`, so a context is cheap to clone
//! and can be handed to worker threads.

use crate::config::Config;
use crate::packed::GeometryCache;
use crate::stage::StageCache;
use crate::traverse::TraverseTable;
use crate::unpack::{DefaultRefiner, Refiner};
use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
pub struct Context {
    stage_cache: Arc<StageCache>,
    traversals: Arc<TraverseTable>,
    geometry_cache: Arc<GeometryCache>,
    refiner: Arc<dyn Refiner>,
}

impl Context {
    /// Context over `stage_cache` with the standard traversals, a default
    /// sized geometry cache and the default refiner.
    pub fn new(stage_cache: Arc<StageCache>) -> Self {
        Self {
            stage_cache,
            traversals: Arc::new(TraverseTable::with_std()),
            geometry_cache: Arc::new(GeometryCache::default()),
            refiner: Arc::new(DefaultRefiner),
        }
    }

    /// Context configured from `config`, reading stage files from disk.
    pub fn from_config(config: &Config) -> Self {
        Self::new(Arc::new(StageCache::with_file_opener()))
            .with_geometry_cache(Arc::new(GeometryCache::new(config.geometry_cache_capacity)))
    }

    pub fn with_traversals(mut self, traversals: Arc<TraverseTable>) -> Self {
        self.traversals = traversals;
        self
    }

    pub fn with_geometry_cache(mut self, cache: Arc<GeometryCache>) -> Self {
        self.geometry_cache = cache;
        self
    }

    /// Replace the refiner used for generic unpacking.
    pub fn with_refiner(mut self, refiner: Arc<dyn Refiner>) -> Self {
        self.refiner = refiner;
        self
    }

    pub fn stage_cache(&self) -> &StageCache {
        &self.stage_cache
    }

    pub fn traversals(&self) -> &TraverseTable {
        &self.traversals
    }

    pub fn geometry_cache(&self) -> &GeometryCache {
        &self.geometry_cache
    }

    pub fn refiner(&self) -> &dyn Refiner {
        self.refiner.as_ref()
    }

    /// Drop cached stages nobody holds and every converted geometry term.
    pub fn clear_caches(&self) -> usize {
        self.geometry_cache.clear();
        self.stage_cache.evict_unused()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(Arc::new(StageCache::default()))
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("stages", &self.stage_cache.len())
            .field("traversals", &self.traversals)
            .field("geometry_terms", &self.geometry_cache.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traverse::GPRIM_TRAVERSE_NAME;

    #[test]
    fn test_default_context() {
        let ctx = Context::default();
        assert!(ctx.traversals().find(GPRIM_TRAVERSE_NAME).is_some());
        assert_eq!(ctx.geometry_cache().max_entries(), GeometryCache::DEFAULT_CAPACITY);
        assert!(ctx.stage_cache().is_empty());
    }

    #[test]
    fn test_builders_share_services() {
        let table = Arc::new(TraverseTable::new());
        let ctx = Context::default()
            .with_traversals(Arc::clone(&table))
            .with_geometry_cache(Arc::new(GeometryCache::new(0)));
        let copy = ctx.clone();
        assert!(copy.traversals().is_empty());
        assert_eq!(copy.geometry_cache().max_entries(), 0);
        assert!(std::ptr::eq(ctx.stage_cache(), copy.stage_cache()));
    }
}
