//! Stage-open services.
//!
//! The stage cache never reads files itself: it asks a [`StageOpener`].
//! [`FileStageOpener`] reads JSON stage files from disk, while
//! [`MemoryStageOpener`] serves descriptions registered in memory.

use super::description::StageDescription;
use super::stage::{Stage, StageOpts};
use crate::core::StageEdit;
use crate::util::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Opens a stage for a file identifier.
pub trait StageOpener: Send + Sync {
    fn open(&self, identifier: &str, opts: &StageOpts, edit: &StageEdit) -> Result<Stage>;
}

/// Opens JSON stage files from disk.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileStageOpener;

impl StageOpener for FileStageOpener {
    fn open(&self, identifier: &str, opts: &StageOpts, edit: &StageEdit) -> Result<Stage> {
        let desc = StageDescription::load(Path::new(identifier))?;
        Stage::compose(identifier, &desc, opts, edit)
    }
}

/// Serves registered in-memory descriptions; counts opens.
#[derive(Default)]
pub struct MemoryStageOpener {
    descriptions: RwLock<HashMap<String, Arc<StageDescription>>>,
    opens: AtomicUsize,
}

impl MemoryStageOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the description served for `identifier`.
    pub fn insert(&self, identifier: impl Into<String>, desc: StageDescription) {
        self.descriptions.write().insert(identifier.into(), Arc::new(desc));
    }

    /// Number of successful opens so far.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::Relaxed)
    }
}

impl StageOpener for MemoryStageOpener {
    fn open(&self, identifier: &str, opts: &StageOpts, edit: &StageEdit) -> Result<Stage> {
        let desc = self
            .descriptions
            .read()
            .get(identifier)
            .cloned()
            .ok_or_else(|| Error::FileNotFound(identifier.into()))?;
        let stage = Stage::compose(identifier, &desc, opts, edit)?;
        self.opens.fetch_add(1, Ordering::Relaxed);
        Ok(stage)
    }
}
