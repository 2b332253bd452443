//! Stage cache implementation.
//!
//! Maps (file identifier, load options, variant edit) to an opened stage.
//! Lookups with identical keys return the same [`StageRef`]; the `Arc`
//! strong count doubles as the stage's reference count.
//!
//! Uses `parking_lot::RwLock` for faster, non-poisoning locks: lookups take
//! the read lock, only inserting or evicting stages takes the write lock.
//! Stages are opened outside of any lock.

use super::opener::{FileStageOpener, StageOpener};
use super::prim::Prim;
use super::stage::{StageOpts, StageRef};
use crate::core::{PrimPath, StageEdit};
use crate::util::{Diagnostics, Error, Result, Severity};
use parking_lot::RwLock;
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Key for cache entries.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StageKey {
    /// File identifier.
    pub file: String,
    pub opts: StageOpts,
    /// Variant selections applied while composing.
    pub edit: StageEdit,
}

impl StageKey {
    pub fn new(file: impl Into<String>, opts: StageOpts, edit: StageEdit) -> Self {
        Self { file: file.into(), opts, edit }
    }
}

/// Thread-safe cache of opened stages.
pub struct StageCache {
    /// Cache storage.
    stages: RwLock<HashMap<StageKey, StageRef>>,
    opener: Arc<dyn StageOpener>,
    /// Stages opened through this cache.
    opened: AtomicUsize,
    /// Lookups served from the cache.
    hits: AtomicUsize,
}

impl StageCache {
    /// Create a cache that opens stages through `opener`.
    pub fn new(opener: Arc<dyn StageOpener>) -> Self {
        Self {
            stages: RwLock::new(HashMap::new()),
            opener,
            opened: AtomicUsize::new(0),
            hits: AtomicUsize::new(0),
        }
    }

    /// Create a cache reading JSON stage files from disk.
    pub fn with_file_opener() -> Self {
        Self::new(Arc::new(FileStageOpener))
    }

    /// Get an already opened stage.
    #[inline]
    pub fn find(&self, file: &str, opts: &StageOpts, edit: &StageEdit) -> Option<StageRef> {
        let key = StageKey::new(file, opts.clone(), edit.clone());
        self.stages.read().get(&key).cloned()
    }

    /// Get a stage, opening it on a miss.
    ///
    /// Two threads missing on the same key may both open it; the first to
    /// insert wins and both receive its stage.
    pub fn find_or_open(&self, file: &str, opts: &StageOpts, edit: &StageEdit) -> Result<StageRef> {
        if file.is_empty() {
            return Err(Error::stage_open(file, "empty file identifier"));
        }
        let key = StageKey::new(file, opts.clone(), edit.clone());
        if let Some(stage) = self.stages.read().get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(stage));
        }

        let stage = Arc::new(self.opener.open(file, opts, edit)?);
        self.opened.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(file, "opened stage");
        Ok(self.insert(key, stage))
    }

    fn insert(&self, key: StageKey, stage: StageRef) -> StageRef {
        let mut stages = self.stages.write();
        Arc::clone(stages.entry(key).or_insert(stage))
    }

    /// Bind a prim, stripping variant selections from `path` into a stage edit.
    ///
    /// Failures are reported into `diagnostics` with `severity`.
    pub fn get_prim(
        &self,
        file: &str,
        path: &PrimPath,
        opts: &StageOpts,
        diagnostics: &Diagnostics,
        severity: Severity,
    ) -> Option<Prim> {
        let (plain, edit) = path.strip_variants();
        let stage = match self.find_or_open(file, opts, &edit) {
            Ok(stage) => stage,
            Err(e) => {
                diagnostics.report(severity, e.to_string());
                return None;
            }
        };
        let prim = Prim::at_path(&stage, &plain);
        if prim.is_none() {
            let err = Error::PrimNotFound { file: file.to_string(), path: path.to_string() };
            diagnostics.report(severity, err.to_string());
        }
        prim
    }

    /// Bind a batch of (file, path) requests; results line up with the input.
    #[tracing::instrument(level = "debug", skip_all, fields(count = requests.len()))]
    pub fn bind_prims(
        &self,
        requests: &[(String, PrimPath)],
        opts: &StageOpts,
        diagnostics: &Diagnostics,
        severity: Severity,
    ) -> Vec<Option<Prim>> {
        let files: Vec<String> = requests.iter().map(|(f, _)| f.clone()).collect();
        // Warm the cache in parallel; errors resurface per request below.
        let _ = self.find_or_open_many(&files, opts);
        requests
            .iter()
            .map(|(file, path)| self.get_prim(file, path, opts, diagnostics, severity))
            .collect()
    }

    /// Open every file not yet cached in parallel, then insert them.
    ///
    /// Results line up with `files`.
    pub fn find_or_open_many(&self, files: &[String], opts: &StageOpts) -> Vec<Result<StageRef>> {
        let edit = StageEdit::default();
        let missing: Vec<&String> = {
            let stages = self.stages.read();
            let mut seen = std::collections::HashSet::new();
            files
                .iter()
                .filter(|f| !f.is_empty())
                .filter(|f| !stages.contains_key(&StageKey::new(f.as_str(), opts.clone(), edit.clone())))
                .filter(|f| seen.insert(f.as_str()))
                .collect()
        };

        let opened: Vec<(StageKey, Result<StageRef>)> = missing
            .par_iter()
            .map(|f| {
                let key = StageKey::new(f.as_str(), opts.clone(), edit.clone());
                let stage = self.opener.open(f, opts, &edit).map(Arc::new);
                (key, stage)
            })
            .collect();

        let mut failures = HashMap::new();
        {
            let mut stages = self.stages.write();
            for (key, stage) in opened {
                match stage {
                    Ok(stage) => {
                        self.opened.fetch_add(1, Ordering::Relaxed);
                        stages.entry(key).or_insert(stage);
                    }
                    Err(e) => {
                        failures.insert(key.file, e.to_string());
                    }
                }
            }
        }

        files
            .iter()
            .map(|f| match failures.get(f) {
                Some(reason) => Err(Error::stage_open(f.as_str(), reason.as_str())),
                None => self.find_or_open(f, opts, &edit),
            })
            .collect()
    }

    /// Drop every cached stage opened from `file`. Returns how many.
    pub fn evict(&self, file: &str) -> usize {
        let mut stages = self.stages.write();
        let before = stages.len();
        stages.retain(|key, _| key.file != file);
        before - stages.len()
    }

    /// Drop stages nobody outside the cache references. Returns how many.
    pub fn evict_unused(&self) -> usize {
        let mut stages = self.stages.write();
        let before = stages.len();
        stages.retain(|_, stage| Arc::strong_count(stage) > 1);
        before - stages.len()
    }

    /// Clear the entire cache.
    pub fn clear(&self) {
        self.stages.write().clear();
    }

    /// Reference count of a cached stage, the cache's own reference included.
    /// Zero when not cached.
    pub fn ref_count(&self, file: &str, opts: &StageOpts, edit: &StageEdit) -> usize {
        self.find(file, opts, edit)
            .map_or(0, |stage| Arc::strong_count(&stage) - 1)
    }

    /// Get the number of cached stages.
    #[inline]
    pub fn len(&self) -> usize {
        self.stages.read().len()
    }

    /// Check if cache is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stages opened (cache misses) so far.
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::Relaxed)
    }

    /// Lookups served from the cache so far.
    pub fn hit_count(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }
}

impl Default for StageCache {
    fn default() -> Self {
        Self::with_file_opener()
    }
}
