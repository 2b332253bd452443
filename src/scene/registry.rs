//! Id table and typed buckets.

use crate::stage::StageRef;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use super::selection::SelectionState;

/// What an id refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Geometry,
    Light,
    Camera,
    Material,
    /// A path with no drawable of its own, such as a selected ancestor.
    Path,
    /// One instance of an instanced prim.
    Instance,
}

/// A registered scene entity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScenePrim {
    pub id: i32,
    pub path: String,
    pub kind: EntityKind,
}

// ============================================================================
// Buckets
// ============================================================================

/// Entities of one category, keyed by path, with a membership serial.
#[derive(Default)]
struct Bucket {
    members: BTreeMap<String, Arc<ScenePrim>>,
    serial: i64,
}

impl Bucket {
    fn add(&mut self, prim: Arc<ScenePrim>) {
        self.members.insert(prim.path.clone(), prim);
        self.serial += 1;
    }

    fn remove(&mut self, path: &str) -> bool {
        let removed = self.members.remove(path).is_some();
        if removed {
            self.serial += 1;
        }
        removed
    }

    /// Copy members into `out` unless `serial` is already current.
    fn fill(&self, out: &mut Vec<Arc<ScenePrim>>, serial: &mut i64) -> bool {
        if *serial == self.serial {
            return false;
        }
        out.clear();
        out.extend(self.members.values().cloned());
        *serial = self.serial;
        true
    }
}

#[derive(Default)]
struct IdTable {
    by_path: HashMap<String, i32>,
    by_id: HashMap<i32, (String, EntityKind)>,
    next: i32,
}

// ============================================================================
// Registry
// ============================================================================

/// Scene registry shared between the thread that syncs prims and the one
/// drawing them.
///
/// Every bucket has its own lock, held only for a single add, remove or
/// fill. Membership changes bump the bucket serial; content changes are
/// tracked by the separate modification serial.
pub struct SceneRegistry {
    ids: RwLock<IdTable>,
    geometry: Mutex<Bucket>,
    display: Mutex<Bucket>,
    lights: Mutex<Bucket>,
    cameras: Mutex<Bucket>,
    materials: Mutex<Bucket>,
    mod_serial: AtomicI64,
    pub(super) selection: Mutex<SelectionState>,
    pub(super) stage: RwLock<Option<StageRef>>,
}

impl Default for SceneRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneRegistry {
    pub fn new() -> Self {
        Self {
            ids: RwLock::new(IdTable { next: 1, ..Default::default() }),
            geometry: Mutex::new(Bucket::default()),
            display: Mutex::new(Bucket::default()),
            lights: Mutex::new(Bucket::default()),
            cameras: Mutex::new(Bucket::default()),
            materials: Mutex::new(Bucket::default()),
            mod_serial: AtomicI64::new(0),
            selection: Mutex::new(SelectionState::default()),
            stage: RwLock::new(None),
        }
    }

    // ------------------------------------------------------------------------
    // Ids
    // ------------------------------------------------------------------------

    /// Id for `path`, allocated on first reference.
    ///
    /// An existing id keeps its kind, except that a bare [`EntityKind::Path`]
    /// entry is upgraded when the path is registered as something concrete.
    pub fn get_or_create_id(&self, path: &str, kind: EntityKind) -> i32 {
        let existing = self.ids.read().by_path.get(path).copied();
        if let Some(id) = existing {
            if kind == EntityKind::Path || self.prim_type(id) != Some(EntityKind::Path) {
                return id;
            }
        }
        let mut ids = self.ids.write();
        if let Some(&id) = ids.by_path.get(path) {
            if let Some(entry) = ids.by_id.get_mut(&id) {
                if entry.1 == EntityKind::Path {
                    entry.1 = kind;
                }
            }
            return id;
        }
        let id = ids.next;
        ids.next += 1;
        ids.by_path.insert(path.to_string(), id);
        ids.by_id.insert(id, (path.to_string(), kind));
        id
    }

    /// Id of an already registered path.
    pub fn find_id(&self, path: &str) -> Option<i32> {
        self.ids.read().by_path.get(path).copied()
    }

    pub fn lookup_path(&self, id: i32) -> Option<String> {
        self.ids.read().by_id.get(&id).map(|(p, _)| p.clone())
    }

    pub fn prim_type(&self, id: i32) -> Option<EntityKind> {
        self.ids.read().by_id.get(&id).map(|(_, k)| *k)
    }

    /// Number of ids ever allocated.
    pub fn id_count(&self) -> usize {
        self.ids.read().by_id.len()
    }

    /// Registered paths matching `pattern`, sorted.
    pub fn convert_selection(&self, pattern: &str) -> Vec<String> {
        let pattern = crate::util::Pattern::new(pattern);
        let mut paths: Vec<String> = self
            .ids
            .read()
            .by_id
            .values()
            .filter(|(p, k)| *k != EntityKind::Instance && pattern.matches(p))
            .map(|(p, _)| p.clone())
            .collect();
        paths.sort();
        paths
    }

    // ------------------------------------------------------------------------
    // Buckets
    // ------------------------------------------------------------------------

    fn add_to(&self, bucket: &Mutex<Bucket>, path: &str, kind: EntityKind) -> Arc<ScenePrim> {
        let id = self.get_or_create_id(path, kind);
        let prim = Arc::new(ScenePrim { id, path: path.to_string(), kind });
        bucket.lock().add(Arc::clone(&prim));
        tracing::trace!(id, path, ?kind, "scene prim added");
        prim
    }

    pub fn add_geometry(&self, path: &str) -> Arc<ScenePrim> {
        self.add_to(&self.geometry, path, EntityKind::Geometry)
    }

    pub fn remove_geometry(&self, path: &str) -> bool {
        self.geometry.lock().remove(path)
    }

    /// Add geometry to the displayed subset, registering it as geometry too.
    pub fn add_display_geometry(&self, path: &str) -> Arc<ScenePrim> {
        let prim = self.add_geometry(path);
        self.display.lock().add(Arc::clone(&prim));
        prim
    }

    pub fn remove_display_geometry(&self, path: &str) -> bool {
        self.display.lock().remove(path)
    }

    pub fn add_light(&self, path: &str) -> Arc<ScenePrim> {
        self.add_to(&self.lights, path, EntityKind::Light)
    }

    pub fn remove_light(&self, path: &str) -> bool {
        self.lights.lock().remove(path)
    }

    pub fn add_camera(&self, path: &str) -> Arc<ScenePrim> {
        self.add_to(&self.cameras, path, EntityKind::Camera)
    }

    pub fn remove_camera(&self, path: &str) -> bool {
        self.cameras.lock().remove(path)
    }

    pub fn add_material(&self, path: &str) -> Arc<ScenePrim> {
        self.add_to(&self.materials, path, EntityKind::Material)
    }

    pub fn remove_material(&self, path: &str) -> bool {
        self.materials.lock().remove(path)
    }

    /// Id used to bind a material by path; registers the path when new.
    pub fn material_id(&self, path: &str) -> i32 {
        self.get_or_create_id(path, EntityKind::Material)
    }

    pub fn num_geometry(&self) -> usize {
        self.geometry.lock().members.len()
    }

    pub fn num_materials(&self) -> usize {
        self.materials.lock().members.len()
    }

    /// Fill `out` with the displayed geometry when `serial` is stale.
    ///
    /// Returns false and leaves `out` untouched when `serial` matches the
    /// bucket; otherwise replaces `out`, updates `serial` and returns true.
    pub fn fill_geometry(&self, out: &mut Vec<Arc<ScenePrim>>, serial: &mut i64) -> bool {
        self.display.lock().fill(out, serial)
    }

    pub fn fill_lights(&self, out: &mut Vec<Arc<ScenePrim>>, serial: &mut i64) -> bool {
        self.lights.lock().fill(out, serial)
    }

    pub fn fill_cameras(&self, out: &mut Vec<Arc<ScenePrim>>, serial: &mut i64) -> bool {
        self.cameras.lock().fill(out, serial)
    }

    // ------------------------------------------------------------------------
    // Serials
    // ------------------------------------------------------------------------

    /// Bumped when displayed geometry is added or removed.
    pub fn geo_serial(&self) -> i64 {
        self.display.lock().serial
    }

    pub fn light_serial(&self) -> i64 {
        self.lights.lock().serial
    }

    pub fn camera_serial(&self) -> i64 {
        self.cameras.lock().serial
    }

    /// Bumped whenever a member's contents are resynchronized.
    pub fn mod_serial(&self) -> i64 {
        self.mod_serial.load(Ordering::Acquire)
    }

    pub fn bump_mod_serial(&self) -> i64 {
        self.mod_serial.fetch_add(1, Ordering::AcqRel) + 1
    }

    // ------------------------------------------------------------------------
    // Stage
    // ------------------------------------------------------------------------

    /// Stage used to walk the hierarchy for child and sibling selection.
    pub fn set_stage(&self, stage: Option<StageRef>) {
        *self.stage.write() = stage;
    }
}

impl fmt::Debug for SceneRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneRegistry")
            .field("ids", &self.id_count())
            .field("geometry", &self.num_geometry())
            .field("mod_serial", &self.mod_serial())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_stable_and_never_reused() {
        let scene = SceneRegistry::new();
        let a = scene.add_geometry("/a").id;
        let b = scene.add_light("/b").id;
        assert_ne!(a, b);
        assert_eq!(scene.get_or_create_id("/a", EntityKind::Geometry), a);

        assert!(scene.remove_geometry("/a"));
        assert!(!scene.remove_geometry("/a"));
        assert_eq!(scene.lookup_path(a).as_deref(), Some("/a"));
        assert_eq!(scene.add_geometry("/a").id, a);

        let c = scene.get_or_create_id("/c", EntityKind::Camera);
        assert!(c > b);
        assert_eq!(scene.prim_type(c), Some(EntityKind::Camera));
        assert_eq!(scene.id_count(), 3);
    }

    #[test]
    fn test_path_ids_upgrade() {
        let scene = SceneRegistry::new();
        let id = scene.get_or_create_id("/p", EntityKind::Path);
        assert_eq!(scene.add_camera("/p").id, id);
        assert_eq!(scene.prim_type(id), Some(EntityKind::Camera));
        assert_eq!(scene.get_or_create_id("/p", EntityKind::Path), id);
        assert_eq!(scene.prim_type(id), Some(EntityKind::Camera));
    }

    #[test]
    fn test_fill_serials() {
        let scene = SceneRegistry::new();
        let mut out = Vec::new();
        let mut serial = scene.geo_serial();
        assert!(!scene.fill_geometry(&mut out, &mut serial));

        scene.add_geometry("/hidden");
        assert!(!scene.fill_geometry(&mut out, &mut serial));
        scene.add_display_geometry("/b");
        scene.add_display_geometry("/a");
        assert!(scene.fill_geometry(&mut out, &mut serial));
        assert_eq!(serial, scene.geo_serial());
        let paths: Vec<&str> = out.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(paths, vec!["/a", "/b"]);

        // Unchanged: output is left alone.
        out.push(Arc::new(ScenePrim { id: -1, path: "x".into(), kind: EntityKind::Path }));
        assert!(!scene.fill_geometry(&mut out, &mut serial));
        assert_eq!(out.len(), 3);

        scene.remove_display_geometry("/a");
        assert!(scene.fill_geometry(&mut out, &mut serial));
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_mod_serial_independent_of_membership() {
        let scene = SceneRegistry::new();
        let (geo, lights, cams) = (scene.geo_serial(), scene.light_serial(), scene.camera_serial());
        assert_eq!(scene.bump_mod_serial(), 1);
        assert_eq!(scene.mod_serial(), 1);
        assert_eq!((scene.geo_serial(), scene.light_serial(), scene.camera_serial()), (geo, lights, cams));

        scene.add_light("/l");
        scene.add_camera("/c");
        assert_eq!(scene.mod_serial(), 1);
        let mut out = Vec::new();
        let mut serial = lights;
        assert!(scene.fill_lights(&mut out, &mut serial));
        let mut serial = cams;
        assert!(scene.fill_cameras(&mut out, &mut serial));
        assert_eq!(out[0].kind, EntityKind::Camera);
    }

    #[test]
    fn test_materials_and_patterns() {
        let scene = SceneRegistry::new();
        let id = scene.material_id("/mtl/steel");
        assert_eq!(scene.add_material("/mtl/steel").id, id);
        assert_eq!(scene.num_materials(), 1);
        scene.add_geometry("/geo/a");
        scene.get_or_create_id("/geo/a[0]", EntityKind::Instance);
        assert_eq!(scene.convert_selection("/geo/*"), vec!["/geo/a"]);
    }
}
