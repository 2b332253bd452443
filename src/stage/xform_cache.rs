//! Per-stage transform and bounds caches.
//!
//! Both caches memoize pure functions of their keys. Entries are never
//! invalidated because stages are immutable once composed.
//!
//! Uses `parking_lot::RwLock` for faster, non-poisoning locks
//! and atomics for lock-free statistics.

use super::prim::{Prim, PrimId};
use crate::core::{Purpose, PurposeSet, TimeCode};
use crate::util::{BBox3d, DMat4};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Local-to-world transforms keyed by (prim, time).
pub struct XformCache {
    entries: RwLock<HashMap<(PrimId, u64), DMat4>>,
    computed: AtomicUsize,
}

impl XformCache {
    pub fn new() -> Self {
        Self { entries: RwLock::new(HashMap::new()), computed: AtomicUsize::new(0) }
    }

    /// World transform of `prim` at `time`.
    pub fn local_to_world(&self, prim: &Prim, time: TimeCode) -> DMat4 {
        let key = (prim.id(), time.bits());
        if let Some(m) = self.entries.read().get(&key) {
            return *m;
        }
        let parent = prim
            .parent()
            .map_or(DMat4::IDENTITY, |p| self.local_to_world(&p, time));
        let world = parent * prim.local_transform(time);
        self.computed.fetch_add(1, Ordering::Relaxed);
        self.entries.write().insert(key, world);
        world
    }

    /// Number of transforms computed (cache misses) so far.
    pub fn computations(&self) -> usize {
        self.computed.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for XformCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Untransformed bounds keyed by (prim, time, purposes).
pub struct BoundsCache {
    entries: RwLock<HashMap<(PrimId, u64, u32), BBox3d>>,
    computed: AtomicUsize,
}

impl BoundsCache {
    pub fn new() -> Self {
        Self { entries: RwLock::new(HashMap::new()), computed: AtomicUsize::new(0) }
    }

    /// Bound of the geometry at and below `prim`, in `prim`'s local space.
    ///
    /// Only prims whose computed purpose is in `purposes` contribute;
    /// inactive and invisible subtrees are skipped. Returns an empty box
    /// when nothing contributes.
    pub fn untransformed_bound(&self, prim: &Prim, time: TimeCode, purposes: PurposeSet) -> BBox3d {
        let key = (prim.id(), time.bits(), purposes.bits());
        if let Some(b) = self.entries.read().get(&key) {
            return *b;
        }
        let mut bbox = BBox3d::EMPTY;
        if prim.is_visible(time) {
            let inherited = prim.parent().map_or(Purpose::Default, |p| p.computed_purpose());
            accumulate(prim, None, time, purposes, inherited, &mut bbox);
        }
        self.computed.fetch_add(1, Ordering::Relaxed);
        self.entries.write().insert(key, bbox);
        bbox
    }

    /// Number of bounds computed (cache misses) so far.
    pub fn computations(&self) -> usize {
        self.computed.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BoundsCache {
    fn default() -> Self {
        Self::new()
    }
}

/// `relative` is `None` for the starting prim, whose own transform is excluded.
fn accumulate(
    prim: &Prim,
    relative: Option<DMat4>,
    time: TimeCode,
    purposes: PurposeSet,
    inherited: Purpose,
    out: &mut BBox3d,
) {
    if !prim.is_active() {
        return;
    }
    if relative.is_some() && prim.authored_visibility(time).is_some_and(|v| v.is_invisible()) {
        return;
    }
    let purpose = match prim.purpose() {
        Purpose::Default => inherited,
        p => p,
    };
    if !purposes.includes(purpose) {
        return;
    }
    let xform = relative.map_or(DMat4::IDENTITY, |r| r * prim.local_transform(time));
    if let Some(points) = prim.points(time) {
        for p in points {
            out.expand_by_point(xform.transform_point3(*p));
        }
    }
    for child in prim.children() {
        accumulate(&child, Some(xform), time, purposes, purpose, out);
    }
}
