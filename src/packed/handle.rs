//! The packed USD primitive handle.
//!
//! A [`PackedUsd`] names one prim on one stage (file, path, frame,
//! purposes) and lazily binds it through the [`StageCache`]. Everything
//! derived from those identifying fields lives in per-handle cache slots
//! behind a mutex, so a handle can be read through `&self` from any thread.
//!
//! Setters that change an identifying field empty every slot; setters that
//! receive the value already held leave the slots untouched.

use super::instance_key::InstanceKey;
use crate::context::Context;
use crate::core::{Options, PrimPath, PurposeSet, TimeCode};
use crate::stage::{Prim, StageCache, StageOpts};
use crate::unpack::GeomTerm;
use crate::util::{BBox3d, DMat4, Diagnostics, Severity};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Option keys
// ============================================================================

pub const FILE_NAME_KEYS: &[&str] = &["usdFileName", "fileName"];
pub const ALT_FILE_NAME_KEYS: &[&str] = &["usdAltFileName", "altFileName"];
pub const PRIM_PATH_KEYS: &[&str] = &["usdPrimPath", "nodePath"];
pub const SRC_PRIM_PATH_KEYS: &[&str] = &["usdSrcPrimPath"];
pub const INDEX_KEYS: &[&str] = &["usdIndex"];
pub const FRAME_KEYS: &[&str] = &["usdFrame", "frame"];
pub const PURPOSE_KEY: &str = "usdViewportPurpose";

/// Type name reported for packed USD primitives.
pub const PACKED_USD_TYPE_NAME: &str = "PackedUSD";

/// How the viewport draws a packed primitive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ViewportLod {
    #[default]
    Full,
    Points,
    Box,
    Centroid,
    Hidden,
}

impl ViewportLod {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "full" => Some(Self::Full),
            "points" => Some(Self::Points),
            "box" => Some(Self::Box),
            "centroid" => Some(Self::Centroid),
            "hidden" => Some(Self::Hidden),
            _ => None,
        }
    }

    pub fn as_token(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Points => "points",
            Self::Box => "box",
            Self::Centroid => "centroid",
            Self::Hidden => "hidden",
        }
    }
}

// ============================================================================
// Cache slots
// ============================================================================

#[derive(Default)]
struct Caches {
    prim: Option<Prim>,
    transform: Option<DMat4>,
    bounds: Option<BBox3d>,
    geometry: Option<Arc<GeomTerm>>,
    master_path: Option<String>,
}

/// Validity of each derived cache slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheState {
    pub prim: bool,
    pub transform: bool,
    pub bounds: bool,
    pub geometry: bool,
    pub master_path: bool,
}

impl CacheState {
    /// True when no slot holds a value.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Handle to one prim of a stage file, placed in a [`Detail`](crate::geom::Detail).
pub struct PackedUsd {
    file_name: String,
    alt_file_name: String,
    prim_path: PrimPath,
    src_prim_path: PrimPath,
    index: i64,
    frame: TimeCode,
    purposes: PurposeSet,
    lod: ViewportLod,
    caches: Mutex<Caches>,
}

impl Default for PackedUsd {
    fn default() -> Self {
        Self {
            file_name: String::new(),
            alt_file_name: String::new(),
            prim_path: PrimPath::empty(),
            src_prim_path: PrimPath::empty(),
            index: -1,
            frame: TimeCode::Default,
            purposes: PurposeSet::default(),
            lod: ViewportLod::Full,
            caches: Mutex::new(Caches::default()),
        }
    }
}

impl Clone for PackedUsd {
    /// Copies identifying fields only; the copy starts with empty caches.
    fn clone(&self) -> Self {
        Self {
            file_name: self.file_name.clone(),
            alt_file_name: self.alt_file_name.clone(),
            prim_path: self.prim_path.clone(),
            src_prim_path: self.src_prim_path.clone(),
            index: self.index,
            frame: self.frame,
            purposes: self.purposes,
            lod: self.lod,
            caches: Mutex::new(Caches::default()),
        }
    }
}

impl fmt::Debug for PackedUsd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackedUsd")
            .field("file", &self.file_name)
            .field("path", &self.prim_path)
            .field("frame", &self.frame)
            .field("purposes", &self.purposes)
            .finish_non_exhaustive()
    }
}

impl PackedUsd {
    pub fn new(file: impl Into<String>, prim_path: PrimPath, frame: TimeCode) -> Self {
        Self { file_name: file.into(), prim_path, frame, ..Self::default() }
    }

    // ========================================================================
    // Identifying fields
    // ========================================================================

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn alt_file_name(&self) -> &str {
        &self.alt_file_name
    }

    pub fn prim_path(&self) -> &PrimPath {
        &self.prim_path
    }

    pub fn src_prim_path(&self) -> &PrimPath {
        &self.src_prim_path
    }

    pub fn index(&self) -> i64 {
        self.index
    }

    pub fn frame(&self) -> TimeCode {
        self.frame
    }

    pub fn purposes(&self) -> PurposeSet {
        self.purposes
    }

    pub fn lod(&self) -> ViewportLod {
        self.lod
    }

    /// Returns true when the file changed (and caches were reset).
    pub fn set_file(&mut self, file: &str) -> bool {
        if self.file_name == file {
            return false;
        }
        self.file_name = file.to_string();
        self.reset_caches();
        true
    }

    pub fn set_prim_path(&mut self, path: PrimPath) -> bool {
        if self.prim_path == path {
            return false;
        }
        self.prim_path = path;
        self.reset_caches();
        true
    }

    pub fn set_frame(&mut self, frame: TimeCode) -> bool {
        if self.frame.bits() == frame.bits() {
            return false;
        }
        self.frame = frame;
        self.reset_caches();
        true
    }

    pub fn set_purposes(&mut self, purposes: PurposeSet) -> bool {
        if self.purposes == purposes {
            return false;
        }
        self.purposes = purposes;
        self.reset_caches();
        true
    }

    pub fn set_alt_file(&mut self, file: &str) {
        self.alt_file_name = file.to_string();
    }

    pub fn set_src_prim_path(&mut self, path: PrimPath) {
        self.src_prim_path = path;
    }

    pub fn set_index(&mut self, index: i64) {
        self.index = index;
    }

    pub fn set_lod(&mut self, lod: ViewportLod) {
        self.lod = lod;
    }

    // ========================================================================
    // Caches
    // ========================================================================

    pub fn reset_caches(&self) {
        *self.caches.lock() = Caches::default();
    }

    /// Which cache slots currently hold a value.
    pub fn cache_state(&self) -> CacheState {
        let c = self.caches.lock();
        CacheState {
            prim: c.prim.is_some(),
            transform: c.transform.is_some(),
            bounds: c.bounds.is_some(),
            geometry: c.geometry.is_some(),
            master_path: c.master_path.is_some(),
        }
    }

    /// Seed the prim slot with an already resolved prim.
    pub(crate) fn bind_prim(&self, prim: Prim) {
        self.caches.lock().prim = Some(prim);
    }

    /// Bind the prim through the stage cache.
    ///
    /// Variant selections in the path become a stage edit. A failed bind is
    /// reported with `severity` and not cached, so the next call retries.
    pub fn resolve(
        &self,
        cache: &StageCache,
        diagnostics: &Diagnostics,
        severity: Severity,
    ) -> Option<Prim> {
        if let Some(prim) = &self.caches.lock().prim {
            return Some(prim.clone());
        }
        if self.prim_path.is_empty() {
            diagnostics.report(severity, format!("Empty prim path in '{}'", self.file_name));
            return None;
        }
        let prim = cache.get_prim(
            &self.file_name,
            &self.prim_path,
            &StageOpts::load_all(),
            diagnostics,
            severity,
        )?;
        let mut caches = self.caches.lock();
        Some(caches.prim.get_or_insert(prim).clone())
    }

    /// Local-to-world transform of the prim at the handle's frame.
    ///
    /// Identity for an unresolvable prim (not cached) and for prims that
    /// carry no transform (cached).
    pub fn world_transform(&self, cache: &StageCache, diagnostics: &Diagnostics) -> DMat4 {
        if let Some(m) = self.caches.lock().transform {
            return m;
        }
        let Some(prim) = self.resolve(cache, diagnostics, Severity::Warning) else {
            diagnostics.warn(format!("Invalid prim! {}", self.prim_path));
            return DMat4::IDENTITY;
        };
        let xform = if prim.is_xformable() {
            prim.stage().xform_cache().local_to_world(&prim, self.frame)
        } else {
            DMat4::IDENTITY
        };
        self.caches.lock().transform = Some(xform);
        xform
    }

    /// Untransformed bound of the prim for the handle's frame and purposes.
    ///
    /// Returns an empty (invalid) box when the prim cannot be resolved or is
    /// not imageable; failures are not cached.
    pub fn bounds(&self, cache: &StageCache, diagnostics: &Diagnostics) -> BBox3d {
        if let Some(b) = self.caches.lock().bounds {
            return b;
        }
        let Some(prim) = self.resolve(cache, diagnostics, Severity::Warning) else {
            return BBox3d::EMPTY;
        };
        if !prim.is_imageable() {
            diagnostics.warn(format!(
                "Cannot compute bounds of non-imageable prim {} <{}>",
                prim.path(),
                prim.type_name()
            ));
            return BBox3d::EMPTY;
        }
        let bbox = prim
            .stage()
            .bounds_cache()
            .untransformed_bound(&prim, self.frame, self.purposes);
        self.caches.lock().bounds = Some(bbox);
        bbox
    }

    /// Structural key of the geometry this handle converts to.
    ///
    /// Instances and instance proxies use the master key so that every
    /// instance of one master shares an entry. An unresolvable prim yields a
    /// key built from the prim path, which is not cached.
    pub fn instance_key(&self, cache: &StageCache, diagnostics: &Diagnostics) -> InstanceKey {
        let master_path = self.caches.lock().master_path.clone();
        let path = match master_path {
            Some(p) => p,
            None => match self.resolve(cache, diagnostics, Severity::Warning) {
                Some(prim) => {
                    let path = InstanceKey::master_path_of(&prim).unwrap_or_else(|| self.prim_path.to_string());
                    self.caches.lock().master_path = Some(path.clone());
                    path
                }
                None => self.prim_path.to_string(),
            },
        };
        InstanceKey {
            file: self.file_name.clone(),
            path,
            time: self.frame,
            purposes: self.purposes,
        }
    }

    /// Converted geometry term, shared through the context's geometry cache.
    pub fn full_geometry(&self, ctx: &Context, diagnostics: &Diagnostics) -> Option<Arc<GeomTerm>> {
        if let Some(term) = &self.caches.lock().geometry {
            return Some(Arc::clone(term));
        }
        let prim = self.resolve(ctx.stage_cache(), diagnostics, Severity::Warning)?;
        let key = self.instance_key(ctx.stage_cache(), diagnostics);
        let term = ctx
            .geometry_cache()
            .get_or_insert_with(&key, || GeomTerm::define_for_read(&prim, self.frame, self.purposes))?;
        self.caches.lock().geometry = Some(Arc::clone(&term));
        Some(term)
    }

    // ========================================================================
    // Intrinsics
    // ========================================================================

    /// Type name of the resolved prim; empty when unresolvable.
    pub fn intrinsic_type(&self, cache: &StageCache, diagnostics: &Diagnostics) -> String {
        self.resolve(cache, diagnostics, Severity::Warning)
            .map(|p| p.type_name().to_string())
            .unwrap_or_default()
    }

    /// Names of the non-default purposes.
    pub fn intrinsic_purposes(&self) -> Vec<String> {
        self.purposes.intrinsic_names()
    }

    pub fn num_purposes(&self) -> usize {
        self.purposes.num_purposes()
    }

    /// Set purposes by name. `default` is always included.
    pub fn set_intrinsic_purposes<S: AsRef<str>>(&mut self, names: &[S]) -> bool {
        self.set_purposes(PurposeSet::from_names(names) | PurposeSet::DEFAULT)
    }

    /// True when the prim resolves.
    pub fn is_valid(&self, cache: &StageCache, diagnostics: &Diagnostics) -> bool {
        self.resolve(cache, diagnostics, Severity::Message).is_some()
    }

    // ========================================================================
    // Save / load
    // ========================================================================

    /// Identifying fields as a flat record. The resolved prim is never saved.
    pub fn save(&self) -> Options {
        let mut o = Options::new();
        o.set_string(FILE_NAME_KEYS[0], self.file_name.clone());
        o.set_string(ALT_FILE_NAME_KEYS[0], self.alt_file_name.clone());
        o.set_string(PRIM_PATH_KEYS[0], self.prim_path.to_string());
        o.set_string(SRC_PRIM_PATH_KEYS[0], self.src_prim_path.to_string());
        o.set_int(INDEX_KEYS[0], self.index);
        o.set_float(FRAME_KEYS[0], self.frame.numeric());
        o.set_string_array(PURPOSE_KEY, self.intrinsic_purposes());
        o
    }

    /// Read identifying fields, accepting legacy key names, and reset caches.
    pub fn load(&mut self, options: &Options) {
        if let Some(file) = options.import_string(FILE_NAME_KEYS) {
            self.file_name = file.to_string();
        }
        if let Some(file) = options.import_string(ALT_FILE_NAME_KEYS) {
            self.alt_file_name = file.to_string();
        }
        if let Some(path) = options.import_string(PRIM_PATH_KEYS) {
            self.prim_path = parse_or_empty(path);
        }
        if let Some(path) = options.import_string(SRC_PRIM_PATH_KEYS) {
            self.src_prim_path = parse_or_empty(path);
        }
        if let Some(index) = options.import_int(INDEX_KEYS) {
            self.index = index;
        }
        if let Some(frame) = options.import_float(FRAME_KEYS) {
            self.frame = TimeCode::from_numeric(frame);
        }
        if let Some(names) = options.get_string_array(PURPOSE_KEY) {
            self.purposes = PurposeSet::from_names(names) | PurposeSet::DEFAULT;
        }
        self.reset_caches();
    }
}

fn parse_or_empty(path: &str) -> PrimPath {
    PrimPath::new(path).unwrap_or_else(|e| {
        tracing::warn!("{e}");
        PrimPath::empty()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{MemoryStageOpener, StageDescription};
    use crate::util::DVec3;
    use serde_json::json;

    fn stage_cache() -> StageCache {
        let opener = MemoryStageOpener::new();
        let desc: StageDescription = serde_json::from_value(json!({
            "prims": [
                { "name": "geo", "type": "Xform",
                  "xform": { "default": { "translate": [1, 2, 3] } },
                  "children": [
                    { "name": "tri", "type": "Mesh",
                      "points": { "default": [[0,0,0],[1,0,0],[0,1,0]] },
                      "faceVertexCounts": [3], "faceVertexIndices": [0, 1, 2] }
                  ] },
                { "name": "mat", "type": "Material" },
                { "name": "a", "type": "Xform", "instance": "proto" },
                { "name": "b", "type": "Xform", "instance": "proto" }
            ],
            "masters": { "proto": [ { "name": "m", "type": "Mesh" } ] }
        }))
        .unwrap();
        opener.insert("a.usd", desc);
        StageCache::new(Arc::new(opener))
    }

    fn handle(path: &str) -> PackedUsd {
        PackedUsd::new("a.usd", PrimPath::new(path).unwrap(), TimeCode::Default)
    }

    #[test]
    fn test_setters_invalidate_only_on_change() {
        let cache = stage_cache();
        let diags = Diagnostics::new();
        let mut h = handle("/geo");
        h.world_transform(&cache, &diags);
        h.bounds(&cache, &diags);
        let full = h.cache_state();
        assert!(full.prim && full.transform && full.bounds);

        assert!(!h.set_file("a.usd"));
        assert!(!h.set_prim_path(PrimPath::new("/geo").unwrap()));
        assert!(!h.set_frame(TimeCode::Default));
        assert!(!h.set_purposes(PurposeSet::default()));
        assert_eq!(h.cache_state(), full);

        h.set_index(4);
        h.set_alt_file("b.usd");
        assert_eq!(h.cache_state(), full);

        assert!(h.set_frame(TimeCode::Frame(1.0)));
        assert!(h.cache_state().is_empty());
    }

    #[test]
    fn test_world_transform_and_bounds() {
        let cache = stage_cache();
        let diags = Diagnostics::new();
        let h = handle("/geo/tri");
        let m = h.world_transform(&cache, &diags);
        assert_eq!(m.w_axis.truncate(), DVec3::new(1.0, 2.0, 3.0));
        let b = h.bounds(&cache, &diags);
        assert_eq!(b.max, DVec3::new(1.0, 1.0, 0.0));
        assert!(diags.is_empty());

        let bad = handle("/nope");
        assert_eq!(bad.world_transform(&cache, &diags), DMat4::IDENTITY);
        assert!(!bad.bounds(&cache, &diags).is_valid());
        assert!(!bad.cache_state().transform);
        assert!(diags.count_matching("Invalid prim") >= 1);

        let mat = handle("/mat");
        assert!(!mat.bounds(&cache, &diags).is_valid());
        assert_eq!(diags.count_matching("non-imageable"), 1);
    }

    #[test]
    fn test_instance_key_shares_master() {
        let cache = stage_cache();
        let diags = Diagnostics::new();
        let a = handle("/a").instance_key(&cache, &diags);
        let b = handle("/b").instance_key(&cache, &diags);
        assert_eq!(a, b);
        assert!(a.path.ends_with(":/__Master_1"));

        let pa = handle("/a/m").instance_key(&cache, &diags);
        let pb = handle("/b/m").instance_key(&cache, &diags);
        assert_eq!(pa, pb);
        assert!(pa.path.ends_with(":/__Master_1/m"));

        let plain = handle("/geo").instance_key(&cache, &diags);
        assert_eq!(plain.path, "/geo");
    }

    #[test]
    fn test_clone_starts_empty() {
        let cache = stage_cache();
        let diags = Diagnostics::new();
        let h = handle("/geo");
        h.world_transform(&cache, &diags);
        let c = h.clone();
        assert!(c.cache_state().is_empty());
        assert_eq!(c.prim_path(), h.prim_path());
    }

    #[test]
    fn test_save_load() {
        let mut h = handle("/geo{v=a}tri");
        h.set_purposes(PurposeSet::DEFAULT | PurposeSet::RENDER);
        h.set_index(2);
        let saved = h.save();
        assert_eq!(saved.len(), 7);
        assert_eq!(saved.get_string_array(PURPOSE_KEY), Some(&["render".to_string()][..]));

        let mut back = PackedUsd::default();
        back.load(&saved);
        assert_eq!(back.prim_path(), h.prim_path());
        assert_eq!(back.purposes(), h.purposes());
        assert_eq!(back.index(), 2);
        assert!(back.frame().is_default());

        let mut legacy = Options::new();
        legacy.set_string("fileName", "old.usd");
        legacy.set_string("nodePath", "/x");
        legacy.set_float("frame", 7.0);
        let mut h = PackedUsd::default();
        h.load(&legacy);
        assert_eq!(h.file_name(), "old.usd");
        assert_eq!(h.prim_path().as_str(), "/x");
        assert_eq!(h.frame(), TimeCode::Frame(7.0));
    }

    #[test]
    fn test_intrinsic_purposes() {
        let mut h = PackedUsd::default();
        assert!(h.set_intrinsic_purposes(&["guide"]));
        assert_eq!(h.purposes(), PurposeSet::DEFAULT | PurposeSet::GUIDE);
        assert_eq!(h.intrinsic_purposes(), vec!["guide"]);
        assert_eq!(h.num_purposes(), 1);
    }
}
