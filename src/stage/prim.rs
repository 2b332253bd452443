//! Prim handles and per-prim composed data.
//!
//! A [`Prim`] pairs a shared stage with an arena index. It is cheap to
//! clone, `Send + Sync`, and keeps its stage alive.

use super::description::{Interpolation, PrimvarValues, Role};
use super::stage::{Stage, StageRef};
use super::visibility::{self, Visibility};
use crate::core::{PrimPath, Purpose, Sampled, TimeCode};
use crate::util::{DMat4, DVec3};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Index of a prim in its stage arena.
pub type PrimId = usize;

// ============================================================================
// Schema classification
// ============================================================================

/// Schema type of a prim, derived from its type name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimType {
    Untyped,
    Xform,
    Scope,
    Mesh,
    Points,
    BasisCurves,
    Camera,
    Light,
    Material,
    Shader,
    /// Procedural hair; boundable but never converted.
    PxHairman,
    /// Procedural arguments; boundable but never converted.
    PxProcArgs,
    Other,
}

impl PrimType {
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "" => Self::Untyped,
            "Xform" => Self::Xform,
            "Scope" => Self::Scope,
            "Mesh" => Self::Mesh,
            "Points" => Self::Points,
            "BasisCurves" => Self::BasisCurves,
            "Camera" => Self::Camera,
            "Material" => Self::Material,
            "Shader" => Self::Shader,
            "PxHairman" => Self::PxHairman,
            "PxProcArgs" => Self::PxProcArgs,
            n if n.ends_with("Light") => Self::Light,
            _ => Self::Other,
        }
    }

    /// Participates in rendering (has visibility and purpose).
    pub fn is_imageable(self) -> bool {
        !matches!(self, Self::Untyped | Self::Material | Self::Shader | Self::Other)
    }

    /// Carries a local transform.
    pub fn is_xformable(self) -> bool {
        self.is_imageable() && self != Self::Scope
    }

    /// Has an extent: geometry-bearing prims.
    pub fn is_boundable(self) -> bool {
        matches!(
            self,
            Self::Mesh | Self::Points | Self::BasisCurves | Self::PxHairman | Self::PxProcArgs
        )
    }
}

/// Model hierarchy kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModelKind {
    Assembly,
    Group,
    Component,
    Subcomponent,
}

impl ModelKind {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "assembly" => Some(Self::Assembly),
            "group" => Some(Self::Group),
            "component" => Some(Self::Component),
            "subcomponent" => Some(Self::Subcomponent),
            _ => None,
        }
    }

    pub fn as_token(self) -> &'static str {
        match self {
            Self::Assembly => "assembly",
            Self::Group => "group",
            Self::Component => "component",
            Self::Subcomponent => "subcomponent",
        }
    }

    /// Groups include assemblies.
    pub fn is_group(self) -> bool {
        matches!(self, Self::Group | Self::Assembly)
    }

    pub fn is_model(self) -> bool {
        self != Self::Subcomponent
    }
}

// ============================================================================
// Composed data
// ============================================================================

/// Composed primvar.
#[derive(Clone, Debug, PartialEq)]
pub struct Primvar {
    pub name: String,
    pub interpolation: Interpolation,
    pub role: Role,
    pub tuple_size: usize,
    pub values: PrimvarValues,
    pub indices: Option<Vec<usize>>,
}

impl Primvar {
    /// Number of elements after index expansion.
    pub fn element_count(&self) -> usize {
        match &self.indices {
            Some(idx) => idx.len(),
            None => self.values.len() / self.tuple_size.max(1),
        }
    }

    /// Values with indices expanded.
    pub fn flattened(&self) -> PrimvarValues {
        let Some(indices) = &self.indices else {
            return self.values.clone();
        };
        let n = self.tuple_size.max(1);
        fn expand<T: Clone>(src: &[T], indices: &[usize], n: usize) -> Vec<T> {
            indices
                .iter()
                .filter(|&&i| (i + 1) * n <= src.len())
                .flat_map(|&i| src[i * n..(i + 1) * n].iter().cloned())
                .collect()
        }
        match &self.values {
            PrimvarValues::Int(v) => PrimvarValues::Int(expand(v, indices, n)),
            PrimvarValues::Float(v) => PrimvarValues::Float(expand(v, indices, n)),
            PrimvarValues::String(v) => PrimvarValues::String(expand(v, indices, n)),
        }
    }
}

/// How a prim relates to instancing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum InstanceLink {
    None,
    /// Instance prim; children are proxies of the master's children.
    Instance { master: PrimId },
    /// Proxy standing in for `prim_in_master` below an instance.
    Proxy { prim_in_master: PrimId },
    /// Lives inside a master subtree.
    InMaster,
}

/// Arena entry for one composed prim.
#[derive(Clone, Debug)]
pub(crate) struct PrimData {
    pub path: PrimPath,
    pub type_name: String,
    pub prim_type: PrimType,
    pub parent: Option<PrimId>,
    pub children: Vec<PrimId>,
    pub active: bool,
    pub purpose: Purpose,
    pub kind: Option<ModelKind>,
    pub visibility: Option<Sampled<Visibility>>,
    pub xform: Option<Sampled<DMat4>>,
    pub points: Option<Sampled<Vec<DVec3>>>,
    pub face_counts: Vec<i32>,
    pub face_indices: Vec<i32>,
    pub primvars: Vec<Primvar>,
    pub instance: InstanceLink,
}

// ============================================================================
// Prim handle
// ============================================================================

/// Handle to a prim on a shared stage.
#[derive(Clone)]
pub struct Prim {
    stage: StageRef,
    id: PrimId,
}

impl Prim {
    pub(crate) fn new(stage: StageRef, id: PrimId) -> Self {
        Self { stage, id }
    }

    /// Prim at `path` on `stage`, if composed.
    pub fn at_path(stage: &StageRef, path: &PrimPath) -> Option<Prim> {
        stage.prim_id(path).map(|id| Self::new(Arc::clone(stage), id))
    }

    /// The pseudo-root `/`.
    pub fn pseudo_root(stage: &StageRef) -> Prim {
        Self::new(Arc::clone(stage), Stage::ROOT)
    }

    #[inline]
    pub fn stage(&self) -> &StageRef {
        &self.stage
    }

    #[inline]
    pub fn id(&self) -> PrimId {
        self.id
    }

    #[inline]
    pub(crate) fn data(&self) -> &PrimData {
        self.stage.data(self.id)
    }

    pub fn path(&self) -> &PrimPath {
        &self.data().path
    }

    pub fn name(&self) -> &str {
        self.data().path.name()
    }

    pub fn type_name(&self) -> &str {
        &self.data().type_name
    }

    pub fn prim_type(&self) -> PrimType {
        self.data().prim_type
    }

    pub fn is_pseudo_root(&self) -> bool {
        self.id == Stage::ROOT
    }

    pub fn parent(&self) -> Option<Prim> {
        self.data().parent.map(|id| Self::new(Arc::clone(&self.stage), id))
    }

    pub fn children(&self) -> impl Iterator<Item = Prim> + '_ {
        self.data()
            .children
            .iter()
            .map(move |&id| Self::new(Arc::clone(&self.stage), id))
    }

    pub fn is_active(&self) -> bool {
        self.data().active
    }

    /// Authored purpose of this prim alone.
    pub fn purpose(&self) -> Purpose {
        self.data().purpose
    }

    /// Purpose after inheritance: the nearest non-default purpose walking up.
    pub fn computed_purpose(&self) -> Purpose {
        let mut current = Some(self.clone());
        while let Some(p) = current {
            if p.purpose() != Purpose::Default {
                return p.purpose();
            }
            current = p.parent();
        }
        Purpose::Default
    }

    pub fn kind(&self) -> Option<ModelKind> {
        self.data().kind
    }

    pub fn is_imageable(&self) -> bool {
        self.prim_type().is_imageable()
    }

    pub fn is_xformable(&self) -> bool {
        self.prim_type().is_xformable()
    }

    pub fn is_boundable(&self) -> bool {
        self.prim_type().is_boundable()
    }

    pub fn is_instance(&self) -> bool {
        matches!(self.data().instance, InstanceLink::Instance { .. })
    }

    pub fn is_instance_proxy(&self) -> bool {
        matches!(self.data().instance, InstanceLink::Proxy { .. })
    }

    pub fn is_in_master(&self) -> bool {
        matches!(self.data().instance, InstanceLink::InMaster)
    }

    /// Master of an instance prim.
    pub fn master(&self) -> Option<Prim> {
        match self.data().instance {
            InstanceLink::Instance { master } => Some(Self::new(Arc::clone(&self.stage), master)),
            _ => None,
        }
    }

    /// Prim in the master that an instance proxy stands in for.
    pub fn prim_in_master(&self) -> Option<Prim> {
        match self.data().instance {
            InstanceLink::Proxy { prim_in_master } => {
                Some(Self::new(Arc::clone(&self.stage), prim_in_master))
            }
            _ => None,
        }
    }

    /// Local transform at `time`; identity when none is authored.
    pub fn local_transform(&self, time: TimeCode) -> DMat4 {
        self.data()
            .xform
            .as_ref()
            .and_then(|x| x.get(time).copied())
            .unwrap_or(DMat4::IDENTITY)
    }

    /// True when the transform has more than one sample.
    pub fn transform_might_be_time_varying(&self) -> bool {
        self.data().xform.as_ref().is_some_and(Sampled::is_varying)
    }

    /// Authored visibility at `time`, `None` when never authored.
    pub fn authored_visibility(&self, time: TimeCode) -> Option<Visibility> {
        visibility::authored_visibility(self, time)
    }

    pub fn has_authored_visibility(&self) -> bool {
        self.data().visibility.as_ref().is_some_and(Sampled::is_authored)
    }

    /// Visibility after inheritance.
    pub fn is_visible(&self, time: TimeCode) -> bool {
        visibility::is_visible(self, time)
    }

    /// Point positions at `time`.
    pub fn points(&self, time: TimeCode) -> Option<&[DVec3]> {
        self.data().points.as_ref()?.get(time).map(Vec::as_slice)
    }

    pub fn face_vertex_counts(&self) -> &[i32] {
        &self.data().face_counts
    }

    pub fn face_vertex_indices(&self) -> &[i32] {
        &self.data().face_indices
    }

    pub fn primvars(&self) -> &[Primvar] {
        &self.data().primvars
    }

    pub fn primvar(&self, name: &str) -> Option<&Primvar> {
        self.primvars().iter().find(|p| p.name == name)
    }

    /// Pre-order iterator over this prim and its descendants.
    pub fn descendants(&self) -> impl Iterator<Item = Prim> + '_ {
        let mut stack = vec![self.id];
        std::iter::from_fn(move || {
            let id = stack.pop()?;
            stack.extend(self.stage.data(id).children.iter().rev().copied());
            Some(Self::new(Arc::clone(&self.stage), id))
        })
    }
}

impl PartialEq for Prim {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.stage, &other.stage) && self.id == other.id
    }
}

impl Eq for Prim {}

impl Hash for Prim {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.stage.id().hash(state);
        self.id.hash(state);
    }
}

impl fmt::Debug for Prim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Prim({} <{}>)", self.path(), self.type_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prim_type_classes() {
        assert!(PrimType::from_type_name("Mesh").is_boundable());
        assert!(PrimType::from_type_name("SphereLight") == PrimType::Light);
        assert!(PrimType::from_type_name("Xform").is_xformable());
        assert!(!PrimType::from_type_name("Xform").is_boundable());
        assert!(PrimType::from_type_name("Scope").is_imageable());
        assert!(!PrimType::from_type_name("Scope").is_xformable());
        assert!(!PrimType::from_type_name("Material").is_imageable());
        assert!(!PrimType::from_type_name("").is_imageable());
    }

    #[test]
    fn test_model_kind() {
        assert!(ModelKind::from_token("assembly").unwrap().is_group());
        assert!(!ModelKind::Component.is_group());
        assert!(!ModelKind::Subcomponent.is_model());
        assert_eq!(ModelKind::from_token("bogus"), None);
    }

    #[test]
    fn test_primvar_flatten() {
        let pv = Primvar {
            name: "Cd".into(),
            interpolation: Interpolation::Vertex,
            role: Role::Color,
            tuple_size: 2,
            values: PrimvarValues::Float(vec![0.0, 1.0, 2.0, 3.0]),
            indices: Some(vec![1, 0, 1, 9]),
        };
        assert_eq!(pv.element_count(), 4);
        assert_eq!(pv.flattened(), PrimvarValues::Float(vec![2.0, 3.0, 0.0, 1.0, 2.0, 3.0]));
    }
}
