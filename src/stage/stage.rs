//! Composed, immutable stages.
//!
//! [`Stage::compose`] flattens a [`StageDescription`] into a prim arena,
//! applying load options, the population mask, variant selections and
//! instancing. The result never changes; derived data (world transforms,
//! bounds) is memoized in per-stage caches.

use super::description::{PrimDescription, StageDescription};
use super::prim::{InstanceLink, ModelKind, PrimData, PrimId, PrimType, Primvar};
use super::xform_cache::{BoundsCache, XformCache};
use crate::core::{PrimPath, Purpose, StageEdit};
use crate::stage::description::Role;
use crate::util::{DVec3, Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared handle to an opened stage.
pub type StageRef = Arc<Stage>;

static NEXT_STAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Options a stage is opened with. Part of the stage cache key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct StageOpts {
    /// Compose payload contents.
    pub load_all: bool,
    /// When non-empty, only these paths, their ancestors and descendants
    /// are composed.
    pub population_mask: Vec<PrimPath>,
}

impl StageOpts {
    /// Load everything, no mask.
    pub fn load_all() -> Self {
        Self { load_all: true, population_mask: Vec::new() }
    }

    /// Skip payloads, no mask.
    pub fn load_none() -> Self {
        Self::default()
    }

    pub fn with_mask(mut self, paths: Vec<PrimPath>) -> Self {
        self.population_mask = paths;
        self
    }

    fn includes(&self, path: &PrimPath) -> bool {
        self.population_mask.is_empty()
            || self
                .population_mask
                .iter()
                .any(|m| path.has_prefix(m) || m.has_prefix(path))
    }
}

/// An opened stage.
pub struct Stage {
    id: u64,
    identifier: String,
    opts: StageOpts,
    edit: StageEdit,
    prims: Vec<PrimData>,
    by_path: HashMap<PrimPath, PrimId>,
    masters: Vec<PrimId>,
    xform_cache: XformCache,
    bounds_cache: BoundsCache,
}

impl Stage {
    /// Arena index of the pseudo-root.
    pub const ROOT: PrimId = 0;

    /// Compose a description into a stage.
    #[tracing::instrument(level = "debug", skip(desc, opts, edit))]
    pub fn compose(
        identifier: &str,
        desc: &StageDescription,
        opts: &StageOpts,
        edit: &StageEdit,
    ) -> Result<Stage> {
        let mut composer = Composer {
            identifier,
            desc,
            opts,
            edit,
            prims: vec![pseudo_root()],
            masters: HashMap::new(),
            master_order: Vec::new(),
            in_progress: Vec::new(),
        };
        for prim in &desc.prims {
            composer.compose_prim(prim, Stage::ROOT, false)?;
        }
        let Composer { prims, master_order, .. } = composer;
        let by_path = prims.iter().enumerate().map(|(id, p)| (p.path.clone(), id)).collect();
        tracing::debug!(identifier, prims = prims.len(), masters = master_order.len(), "composed stage");
        Ok(Stage {
            id: NEXT_STAGE_ID.fetch_add(1, Ordering::Relaxed),
            identifier: identifier.to_string(),
            opts: opts.clone(),
            edit: edit.clone(),
            prims,
            by_path,
            masters: master_order,
            xform_cache: XformCache::new(),
            bounds_cache: BoundsCache::new(),
        })
    }

    /// Unique identity token for this stage within the process.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// File identifier the stage was opened from.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn opts(&self) -> &StageOpts {
        &self.opts
    }

    pub fn edit(&self) -> &StageEdit {
        &self.edit
    }

    /// Number of composed prims, pseudo-root and masters included.
    pub fn prim_count(&self) -> usize {
        self.prims.len()
    }

    pub fn prim_id(&self, path: &PrimPath) -> Option<PrimId> {
        self.by_path.get(path).copied()
    }

    /// Root prims of the instance masters, in creation order.
    pub fn master_ids(&self) -> &[PrimId] {
        &self.masters
    }

    pub fn xform_cache(&self) -> &XformCache {
        &self.xform_cache
    }

    pub fn bounds_cache(&self) -> &BoundsCache {
        &self.bounds_cache
    }

    #[inline]
    pub(crate) fn data(&self, id: PrimId) -> &PrimData {
        &self.prims[id]
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("id", &self.id)
            .field("identifier", &self.identifier)
            .field("prims", &self.prims.len())
            .finish()
    }
}

// ============================================================================
// Composition
// ============================================================================

fn pseudo_root() -> PrimData {
    PrimData {
        path: PrimPath::root(),
        type_name: String::new(),
        prim_type: PrimType::Untyped,
        parent: None,
        children: Vec::new(),
        active: true,
        purpose: Purpose::Default,
        kind: None,
        visibility: None,
        xform: None,
        points: None,
        face_counts: Vec::new(),
        face_indices: Vec::new(),
        primvars: Vec::new(),
        instance: InstanceLink::None,
    }
}

struct Composer<'a> {
    identifier: &'a str,
    desc: &'a StageDescription,
    opts: &'a StageOpts,
    edit: &'a StageEdit,
    prims: Vec<PrimData>,
    masters: HashMap<String, PrimId>,
    master_order: Vec<PrimId>,
    in_progress: Vec<String>,
}

impl Composer<'_> {
    fn error(&self, reason: impl Into<String>) -> Error {
        Error::stage_open(self.identifier, reason)
    }

    fn push_child(&mut self, parent: PrimId, data: PrimData) -> Result<PrimId> {
        let name = data.path.name().to_string();
        let siblings = &self.prims[parent].children;
        if siblings.iter().any(|&c| self.prims[c].path.name() == name) {
            return Err(self.error(format!("duplicate prim {}", data.path)));
        }
        let id = self.prims.len();
        self.prims.push(data);
        self.prims[parent].children.push(id);
        Ok(id)
    }

    fn compose_prim(&mut self, desc: &PrimDescription, parent: PrimId, in_master: bool) -> Result<()> {
        let path = self.prims[parent]
            .path
            .append_child(&desc.name)
            .map_err(|e| self.error(e.to_string()))?;
        if !in_master && !self.opts.includes(&path) {
            return Ok(());
        }

        let tuple_default = |role: Role| match role {
            Role::Point | Role::Vector | Role::Normal | Role::Color => 3,
            Role::TexCoord => 2,
            Role::None => 1,
        };
        let data = PrimData {
            type_name: desc.type_name.clone(),
            prim_type: PrimType::from_type_name(&desc.type_name),
            parent: Some(parent),
            children: Vec::new(),
            active: desc.active.unwrap_or(true),
            purpose: desc.purpose,
            kind: desc.kind.as_deref().and_then(ModelKind::from_token),
            visibility: desc.visibility.as_ref().map(|v| v.map(|v| *v)),
            xform: desc.xform.as_ref().map(|x| x.map(|ops| ops.matrix())),
            points: desc
                .points
                .as_ref()
                .map(|p| p.map(|pts| pts.iter().copied().map(DVec3::from).collect())),
            face_counts: desc.face_vertex_counts.clone(),
            face_indices: desc.face_vertex_indices.clone(),
            primvars: desc
                .primvars
                .iter()
                .map(|(name, pv)| Primvar {
                    name: name.clone(),
                    interpolation: pv.interpolation,
                    role: pv.role,
                    tuple_size: pv.tuple_size.unwrap_or_else(|| tuple_default(pv.role)).max(1),
                    values: pv.values.clone(),
                    indices: pv.indices.clone(),
                })
                .collect(),
            instance: if in_master { InstanceLink::InMaster } else { InstanceLink::None },
            path,
        };
        let id = self.push_child(parent, data)?;

        if let Some(master_name) = &desc.instance {
            let master = self.master(master_name)?;
            self.prims[id].instance = InstanceLink::Instance { master };
            for child in self.prims[master].children.clone() {
                self.instantiate(child, id)?;
            }
            return Ok(());
        }

        if desc.payload && !self.opts.load_all {
            return Ok(());
        }

        for child in &desc.children {
            self.compose_prim(child, id, in_master)?;
        }
        let path = self.prims[id].path.clone();
        for (set_name, set) in &desc.variant_sets {
            let selection = self
                .edit
                .selection_for(path.as_str(), set_name)
                .or(set.selection.as_deref());
            if let Some(children) = selection.and_then(|s| set.variants.get(s)) {
                for child in children {
                    self.compose_prim(child, id, in_master)?;
                }
            }
        }
        Ok(())
    }

    /// Root of the named master, composing it on first use.
    fn master(&mut self, name: &str) -> Result<PrimId> {
        if let Some(&id) = self.masters.get(name) {
            return Ok(id);
        }
        if self.in_progress.iter().any(|n| n == name) {
            return Err(self.error(format!("master '{name}' instances itself")));
        }
        let Some(children) = self.desc.masters.get(name) else {
            return Err(self.error(format!("unknown master '{name}'")));
        };
        let path = PrimPath::root()
            .append_child(&format!("__Master_{}", self.master_order.len() + 1))
            .map_err(|e| self.error(e.to_string()))?;
        let id = self.prims.len();
        self.prims.push(PrimData { path, parent: None, instance: InstanceLink::InMaster, ..pseudo_root() });

        self.in_progress.push(name.to_string());
        for child in children {
            self.compose_prim(child, id, true)?;
        }
        self.in_progress.pop();

        self.masters.insert(name.to_string(), id);
        self.master_order.push(id);
        Ok(id)
    }

    /// Mirror the master subtree at `src` below `parent` as instance proxies.
    fn instantiate(&mut self, src: PrimId, parent: PrimId) -> Result<()> {
        let source = &self.prims[src];
        let path = self.prims[parent]
            .path
            .append_child(source.path.name())
            .map_err(|e| self.error(e.to_string()))?;
        if !self.opts.includes(&path) {
            return Ok(());
        }
        let prim_in_master = match source.instance {
            InstanceLink::Proxy { prim_in_master } => prim_in_master,
            _ => src,
        };
        let children = source.children.clone();
        let data = PrimData {
            path,
            parent: Some(parent),
            children: Vec::new(),
            instance: InstanceLink::Proxy { prim_in_master },
            ..source.clone()
        };
        let id = self.push_child(parent, data)?;
        for child in children {
            self.instantiate(child, id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TimeCode;
    use crate::stage::Prim;
    use serde_json::json;

    fn stage(value: serde_json::Value, opts: StageOpts, edit: StageEdit) -> StageRef {
        let desc: StageDescription = serde_json::from_value(value).unwrap();
        Arc::new(Stage::compose("test.usd", &desc, &opts, &edit).unwrap())
    }

    fn p(s: &str) -> PrimPath {
        PrimPath::new(s).unwrap()
    }

    fn fixture() -> serde_json::Value {
        json!({
            "prims": [
                { "name": "world", "type": "Xform", "kind": "assembly", "children": [
                    { "name": "a", "type": "Xform", "instance": "tree" },
                    { "name": "b", "type": "Xform", "instance": "tree" },
                    { "name": "heavy", "type": "Xform", "payload": true, "children": [
                        { "name": "mesh", "type": "Mesh" }
                    ]},
                    { "name": "set", "type": "Xform",
                      "variantSets": { "shape": { "selection": "cube", "variants": {
                          "cube": [ { "name": "cube", "type": "Mesh" } ],
                          "sphere": [ { "name": "sphere", "type": "Mesh" } ]
                      }}}}
                ]}
            ],
            "masters": {
                "tree": [ { "name": "trunk", "type": "Mesh", "children": [] } ]
            }
        })
    }

    #[test]
    fn test_compose_basic() {
        let s = stage(fixture(), StageOpts::load_all(), StageEdit::default());
        let world = Prim::at_path(&s, &p("/world")).unwrap();
        assert_eq!(world.kind(), Some(ModelKind::Assembly));
        assert_eq!(world.children().count(), 4);
        assert!(Prim::at_path(&s, &p("/world/heavy/mesh")).is_some());
        assert!(Prim::at_path(&s, &p("/world/set/cube")).is_some());
        assert!(Prim::at_path(&s, &p("/world/set/sphere")).is_none());
    }

    #[test]
    fn test_payloads_and_mask() {
        let s = stage(fixture(), StageOpts::load_none(), StageEdit::default());
        assert!(Prim::at_path(&s, &p("/world/heavy")).is_some());
        assert!(Prim::at_path(&s, &p("/world/heavy/mesh")).is_none());

        let opts = StageOpts::load_all().with_mask(vec![p("/world/set")]);
        let s = stage(fixture(), opts, StageEdit::default());
        assert!(Prim::at_path(&s, &p("/world")).is_some());
        assert!(Prim::at_path(&s, &p("/world/set/cube")).is_some());
        assert!(Prim::at_path(&s, &p("/world/heavy")).is_none());
    }

    #[test]
    fn test_variant_edit() {
        let (_, edit) = p("/world/set{shape=sphere}").strip_variants();
        let s = stage(fixture(), StageOpts::load_all(), edit);
        assert!(Prim::at_path(&s, &p("/world/set/sphere")).is_some());
        assert!(Prim::at_path(&s, &p("/world/set/cube")).is_none());
    }

    #[test]
    fn test_instancing() {
        let s = stage(fixture(), StageOpts::load_all(), StageEdit::default());
        let a = Prim::at_path(&s, &p("/world/a")).unwrap();
        let b = Prim::at_path(&s, &p("/world/b")).unwrap();
        assert!(a.is_instance());
        assert_eq!(a.master(), b.master());
        assert_eq!(a.master().unwrap().path(), &p("/__Master_1"));

        let trunk = Prim::at_path(&s, &p("/world/a/trunk")).unwrap();
        assert!(trunk.is_instance_proxy());
        let in_master = trunk.prim_in_master().unwrap();
        assert_eq!(in_master.path(), &p("/__Master_1/trunk"));
        assert!(in_master.is_in_master());
        assert_eq!(s.master_ids().len(), 1);

        // Masters are not reachable from the pseudo-root.
        let root = Prim::pseudo_root(&s);
        assert!(root.descendants().all(|d| !d.is_in_master()));
    }

    #[test]
    fn test_errors() {
        let bad = json!({ "prims": [ { "name": "x", "instance": "missing" } ] });
        let desc: StageDescription = serde_json::from_value(bad).unwrap();
        let err = Stage::compose("t", &desc, &StageOpts::load_all(), &StageEdit::default());
        assert!(err.is_err());

        let dup = json!({ "prims": [ { "name": "x" }, { "name": "x" } ] });
        let desc: StageDescription = serde_json::from_value(dup).unwrap();
        assert!(Stage::compose("t", &desc, &StageOpts::load_all(), &StageEdit::default()).is_err());
    }

    #[test]
    fn test_animated_transform() {
        let s = stage(
            json!({ "prims": [ { "name": "x", "type": "Xform", "xform": {
                "samples": [ [10.0, { "translate": [10, 0, 0] }], [1.0, { "translate": [1, 0, 0] }] ]
            }}]}),
            StageOpts::load_all(),
            StageEdit::default(),
        );
        let x = Prim::at_path(&s, &p("/x")).unwrap();
        assert!(x.transform_might_be_time_varying());
        let at = |f: f64| x.local_transform(TimeCode::Frame(f)).w_axis.x;
        assert_eq!(at(0.0), 1.0);
        assert_eq!(at(5.0), 1.0);
        assert_eq!(at(12.0), 10.0);
    }
}
