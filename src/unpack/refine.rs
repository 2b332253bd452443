//! Geometry terms and their refinement into concrete details.
//!
//! A [`GeomTerm`] is the lazy, host-independent description of what a prim
//! converts to: a mesh, a point set, or a group of transformed children.
//! Terms are cheap to share (the geometry cache hands them out behind an
//! `Arc`) and are turned into [`Detail`] fragments by a [`Refiner`].

use super::{PATH_ATTRIB, PRIM_PATH_ATTRIB};
use crate::core::{PrimPath, Purpose, PurposeSet, TimeCode};
use crate::geom::{AttribOwner, AttributeSet, Detail, TypeInfo};
use crate::stage::{Interpolation, Prim, PrimType, Primvar, PrimvarValues, Role};
use crate::util::{DMat4, DVec3, Error, Pattern, Result};
use serde::{Deserialize, Serialize};

/// Detail attribute listing the primvars that were authored as constants.
pub const CONSTANT_ATTRIBS_NAME: &str = "usdconfigconstantattribs";

// ============================================================================
// Refine parameters
// ============================================================================

/// Settings for refining terms and for the side effects of an unpack.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineParms {
    /// Emit one soup primitive per mesh instead of one polygon per face.
    pub allow_poly_soup: bool,
    /// Primvars to import, as a [`Pattern`].
    pub primvar_pattern: String,
    /// Import `st` as a three component `uv`.
    pub translate_st_to_uv: bool,
    /// Primvars that keep their values when the geometry is transformed.
    pub non_transforming_pattern: String,
    pub add_path_attrib: bool,
    pub add_prim_path_attrib: bool,
    pub add_xform_attrib: bool,
    pub add_visibility_attrib: bool,
}

impl Default for RefineParms {
    fn default() -> Self {
        Self {
            allow_poly_soup: false,
            primvar_pattern: "*".to_string(),
            translate_st_to_uv: true,
            non_transforming_pattern: "rest".to_string(),
            add_path_attrib: true,
            add_prim_path_attrib: true,
            add_xform_attrib: true,
            add_visibility_attrib: true,
        }
    }
}

impl RefineParms {
    pub fn with_primvar_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.primvar_pattern = pattern.into();
        self
    }

    pub fn with_st_to_uv(mut self, value: bool) -> Self {
        self.translate_st_to_uv = value;
        self
    }

    pub fn with_non_transforming_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.non_transforming_pattern = pattern.into();
        self
    }

    pub fn with_poly_soup(mut self, value: bool) -> Self {
        self.allow_poly_soup = value;
        self
    }
}

// ============================================================================
// Geometry terms
// ============================================================================

/// Polygon mesh read from a prim at one time.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshTerm {
    pub path: PrimPath,
    pub points: Vec<DVec3>,
    pub face_counts: Vec<usize>,
    pub face_indices: Vec<usize>,
    pub primvars: Vec<Primvar>,
}

impl MeshTerm {
    pub fn num_faces(&self) -> usize {
        self.face_counts.len()
    }
}

/// Point set read from a prim at one time.
#[derive(Clone, Debug, PartialEq)]
pub struct PointsTerm {
    pub path: PrimPath,
    pub points: Vec<DVec3>,
    pub primvars: Vec<Primvar>,
}

/// Lazy geometry of a prim.
#[derive(Clone, Debug, PartialEq)]
pub enum GeomTerm {
    Mesh(MeshTerm),
    Points(PointsTerm),
    /// Children with their transforms relative to the group.
    Group(Vec<(DMat4, GeomTerm)>),
}

impl GeomTerm {
    /// Read the geometry of `prim` at `time`.
    ///
    /// Transformable non-geometry prims become groups of their active,
    /// visible children whose purpose is in `purposes`. Returns `None` for
    /// prim types that have no geometric form and for meshes whose topology
    /// does not fit their points.
    pub fn define_for_read(prim: &Prim, time: TimeCode, purposes: PurposeSet) -> Option<GeomTerm> {
        match prim.prim_type() {
            PrimType::Mesh => read_mesh(prim, time).map(GeomTerm::Mesh),
            PrimType::Points => Some(GeomTerm::Points(PointsTerm {
                path: prim.path().clone(),
                points: prim.points(time)?.to_vec(),
                primvars: prim.primvars().to_vec(),
            })),
            PrimType::Xform | PrimType::Scope => {
                let children = prim
                    .children()
                    .filter(|c| c.is_active())
                    .filter(|c| !c.authored_visibility(time).is_some_and(|v| v.is_invisible()))
                    .filter(|c| c.purpose() == Purpose::Default || purposes.includes(c.purpose()))
                    .filter_map(|c| {
                        let term = Self::define_for_read(&c, time, purposes)?;
                        let local = if c.is_xformable() { c.local_transform(time) } else { DMat4::IDENTITY };
                        Some((local, term))
                    })
                    .collect();
                Some(GeomTerm::Group(children))
            }
            _ => None,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Self::Group(_))
    }

    /// Total number of points over the whole term.
    pub fn num_points(&self) -> usize {
        match self {
            Self::Mesh(m) => m.points.len(),
            Self::Points(p) => p.points.len(),
            Self::Group(children) => children.iter().map(|(_, t)| t.num_points()).sum(),
        }
    }

    /// Write the term straight into `dest` without refining.
    ///
    /// Only point sets support this; returns false for every other term so
    /// the caller falls back to a generic refine.
    pub fn unpack_direct(
        &self,
        dest: &mut Detail,
        file: &str,
        prim_path: &PrimPath,
        xform: &DMat4,
        parms: &RefineParms,
    ) -> bool {
        let GeomTerm::Points(term) = self else {
            return false;
        };
        let mut fragment = Detail::new();
        let points = fragment.append_points(&term.points);
        let prim = fragment.append_point_cloud(points.collect());
        write_primvars(&mut fragment, &term.primvars, &PointsLayout, parms);

        let prims = dest.merge(&fragment, Some(xform));
        let len = dest.num_primitives();
        let attribs = dest.attribs_mut(AttribOwner::Primitive);
        for (enabled, name, value) in [
            (parms.add_path_attrib, PATH_ATTRIB, file),
            (parms.add_prim_path_attrib, PRIM_PATH_ATTRIB, prim_path.as_str()),
        ] {
            if !enabled {
                continue;
            }
            if let Ok(attrib) = attribs.add_string(name, len) {
                for offset in prims.clone() {
                    attrib.set_string(offset, value);
                }
            }
        }
        tracing::trace!(prim, path = %prim_path, "unpacked points directly");
        true
    }
}

fn read_mesh(prim: &Prim, time: TimeCode) -> Option<MeshTerm> {
    let points = prim.points(time)?.to_vec();
    let face_counts: Vec<usize> = prim
        .face_vertex_counts()
        .iter()
        .map(|&c| usize::try_from(c).ok())
        .collect::<Option<_>>()?;
    let face_indices: Vec<usize> = prim
        .face_vertex_indices()
        .iter()
        .map(|&i| usize::try_from(i).ok().filter(|&i| i < points.len()))
        .collect::<Option<_>>()?;
    if face_counts.iter().sum::<usize>() != face_indices.len() || face_counts.iter().any(|&c| c < 3) {
        tracing::warn!("invalid mesh topology on {}", prim.path());
        return None;
    }
    Some(MeshTerm {
        path: prim.path().clone(),
        points,
        face_counts,
        face_indices,
        primvars: prim.primvars().to_vec(),
    })
}

// ============================================================================
// Refiner
// ============================================================================

/// Turns a geometry term into concrete detail fragments.
pub trait Refiner: Send + Sync {
    fn refine(&self, term: &GeomTerm, parms: &RefineParms) -> Vec<Detail>;
}

/// Refines meshes to polygons (or soups) and point sets to point clouds.
///
/// Each mesh or point set in the term becomes one fragment, already placed
/// by the group transforms above it.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultRefiner;

impl Refiner for DefaultRefiner {
    #[tracing::instrument(level = "debug", skip_all, fields(points = term.num_points()))]
    fn refine(&self, term: &GeomTerm, parms: &RefineParms) -> Vec<Detail> {
        let mut out = Vec::new();
        refine_into(term, &DMat4::IDENTITY, parms, &mut out);
        out
    }
}

fn refine_into(term: &GeomTerm, xform: &DMat4, parms: &RefineParms, out: &mut Vec<Detail>) {
    let mut fragment = match term {
        GeomTerm::Group(children) => {
            for (local, child) in children {
                refine_into(child, &(*xform * *local), parms, out);
            }
            return;
        }
        GeomTerm::Mesh(mesh) => refine_mesh(mesh, parms),
        GeomTerm::Points(points) => {
            let mut d = Detail::new();
            let range = d.append_points(&points.points);
            d.append_point_cloud(range.collect());
            write_primvars(&mut d, &points.primvars, &PointsLayout, parms);
            d
        }
    };
    if *xform != DMat4::IDENTITY {
        fragment.transform(xform);
    }
    out.push(fragment);
}

fn refine_mesh(mesh: &MeshTerm, parms: &RefineParms) -> Detail {
    let mut d = Detail::new();
    let base = d.append_points(&mesh.points).start;
    let mut faces = Vec::with_capacity(mesh.num_faces());
    let mut start = 0;
    for &count in &mesh.face_counts {
        faces.push(mesh.face_indices[start..start + count].iter().map(|i| i + base).collect::<Vec<_>>());
        start += count;
    }
    if parms.allow_poly_soup {
        d.append_poly_soup(&faces);
    } else {
        for face in &faces {
            d.append_polygon(face);
        }
    }
    let layout = MeshLayout { face_counts: &mesh.face_counts, soup: parms.allow_poly_soup };
    write_primvars(&mut d, &mesh.primvars, &layout, parms);
    d
}

// ============================================================================
// Primvar import
// ============================================================================

/// Maps primvar interpolations to an owner class and, per element of that
/// class, the primvar element it reads.
trait PrimvarLayout {
    fn sources(&self, detail: &Detail, interpolation: Interpolation) -> Option<(AttribOwner, Vec<usize>)>;
}

struct PointsLayout;

impl PrimvarLayout for PointsLayout {
    fn sources(&self, detail: &Detail, interpolation: Interpolation) -> Option<(AttribOwner, Vec<usize>)> {
        match interpolation {
            Interpolation::Constant | Interpolation::Uniform => {
                Some((AttribOwner::Primitive, vec![0; detail.num_primitives()]))
            }
            Interpolation::Vertex | Interpolation::Varying => {
                Some((AttribOwner::Point, (0..detail.num_points()).collect()))
            }
            Interpolation::FaceVarying => None,
        }
    }
}

struct MeshLayout<'a> {
    face_counts: &'a [usize],
    soup: bool,
}

impl PrimvarLayout for MeshLayout<'_> {
    fn sources(&self, detail: &Detail, interpolation: Interpolation) -> Option<(AttribOwner, Vec<usize>)> {
        Some(match interpolation {
            Interpolation::Constant => (AttribOwner::Primitive, vec![0; detail.num_primitives()]),
            // A soup is one primitive, so per-face values go on its vertices.
            Interpolation::Uniform if self.soup => (
                AttribOwner::Vertex,
                self.face_counts
                    .iter()
                    .enumerate()
                    .flat_map(|(face, &n)| std::iter::repeat(face).take(n))
                    .collect(),
            ),
            Interpolation::Uniform => (AttribOwner::Primitive, (0..detail.num_primitives()).collect()),
            Interpolation::Vertex | Interpolation::Varying => {
                (AttribOwner::Point, (0..detail.num_points()).collect())
            }
            Interpolation::FaceVarying => (AttribOwner::Vertex, (0..detail.num_vertices()).collect()),
        })
    }
}

fn type_info(role: Role) -> TypeInfo {
    match role {
        Role::None => TypeInfo::None,
        Role::Point => TypeInfo::Point,
        Role::Vector => TypeInfo::Vector,
        Role::Normal => TypeInfo::Normal,
        Role::Color => TypeInfo::Color,
        Role::TexCoord => TypeInfo::TexCoord,
    }
}

fn write_primvars(detail: &mut Detail, primvars: &[Primvar], layout: &dyn PrimvarLayout, parms: &RefineParms) {
    let import = Pattern::new(&parms.primvar_pattern);
    let non_transforming = Pattern::new(&parms.non_transforming_pattern);
    let mut constants = Vec::new();

    for primvar in primvars.iter().filter(|pv| import.matches(&pv.name)) {
        let Some((owner, sources)) = layout.sources(detail, primvar.interpolation) else {
            tracing::debug!(primvar = %primvar.name, "unsupported interpolation");
            continue;
        };
        let (name, info, tuple_size) = if parms.translate_st_to_uv && primvar.name == "st" {
            ("uv", TypeInfo::TexCoord, primvar.tuple_size.max(3))
        } else {
            (primvar.name.as_str(), type_info(primvar.role), primvar.tuple_size)
        };
        let attribs = detail.attribs_mut(owner);
        match write_primvar(attribs, name, tuple_size, primvar, &sources) {
            Ok(()) => {
                if let Some(attrib) = attribs.find_mut(name) {
                    attrib.set_type_info(info);
                    if non_transforming.matches(name) {
                        attrib.set_non_transforming(true);
                    }
                }
                if primvar.interpolation == Interpolation::Constant {
                    constants.push(name.to_string());
                }
            }
            Err(e) => tracing::debug!("skipping primvar: {e}"),
        }
    }

    if !constants.is_empty() {
        if let Ok(attrib) = detail.attribs_mut(AttribOwner::Detail).add_string(CONSTANT_ATTRIBS_NAME, 1) {
            attrib.set_string(0, &constants.join(" "));
        }
    }
}

/// Create `name` on `attribs` and fill element `i` from primvar element
/// `sources[i]`.
fn write_primvar(
    attribs: &mut AttributeSet,
    name: &str,
    tuple_size: usize,
    primvar: &Primvar,
    sources: &[usize],
) -> Result<()> {
    let n = primvar.tuple_size.max(1);
    let values = primvar.flattened();
    let count = values.len() / n;
    if sources.iter().any(|&s| s >= count) {
        return Err(Error::attribute(
            name,
            format!("{count} elements for {:?} interpolation", primvar.interpolation),
        ));
    }
    let len = sources.len();
    match &values {
        PrimvarValues::Float(v) => {
            let attrib = attribs.add_float(name, tuple_size, len)?;
            for (elem, &src) in sources.iter().enumerate() {
                attrib.set_floats(elem, &v[src * n..(src + 1) * n]);
            }
        }
        PrimvarValues::Int(v) => {
            let attrib = attribs.add_int(name, tuple_size, len)?;
            for (elem, &src) in sources.iter().enumerate() {
                attrib.set_ints(elem, &v[src * n..(src + 1) * n]);
            }
        }
        PrimvarValues::String(v) => {
            if n != 1 {
                return Err(Error::attribute(name, "string tuples are not supported"));
            }
            let attrib = attribs.add_string(name, len)?;
            for (elem, &src) in sources.iter().enumerate() {
                attrib.set_string(elem, &v[src]);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageEdit;
    use crate::stage::{Stage, StageDescription, StageOpts, StageRef};
    use serde_json::json;
    use std::sync::Arc;

    fn stage() -> StageRef {
        let desc: StageDescription = serde_json::from_value(json!({
            "prims": [ { "name": "geo", "type": "Xform", "children": [
                { "name": "tri", "type": "Mesh",
                  "xform": { "default": { "translate": [10, 0, 0] } },
                  "points": { "default": [[0,0,0],[1,0,0],[0,1,0],[1,1,0]] },
                  "faceVertexCounts": [3, 3], "faceVertexIndices": [0, 1, 2, 1, 3, 2],
                  "primvars": {
                      "Cd": { "interpolation": "constant", "role": "color", "tupleSize": 3,
                              "values": [1.0, 0.5, 0.0] },
                      "rest": { "interpolation": "vertex", "role": "point", "tupleSize": 3,
                                "values": [0.0,0.0,0.0, 1.0,0.0,0.0, 0.0,1.0,0.0, 1.0,1.0,0.0] },
                      "st": { "interpolation": "faceVarying", "role": "texCoord", "tupleSize": 2,
                              "values": [0.0,0.0, 1.0,0.0], "indices": [0, 1, 0, 1, 1, 0] },
                      "id": { "interpolation": "uniform", "values": [4, 5] },
                      "bad name": { "interpolation": "constant", "values": [1] }
                  } },
                { "name": "broken", "type": "Mesh",
                  "points": { "default": [[0,0,0]] },
                  "faceVertexCounts": [3], "faceVertexIndices": [0, 1, 2] },
                { "name": "cloud", "type": "Points",
                  "points": { "default": [[0,0,0],[0,0,1]] },
                  "primvars": { "width": { "interpolation": "vertex", "values": [0.1, 0.2] } } },
                { "name": "guide", "type": "Mesh", "purpose": "guide",
                  "points": { "default": [[0,0,0],[1,0,0],[0,1,0]] },
                  "faceVertexCounts": [3], "faceVertexIndices": [0, 1, 2] },
                { "name": "cam", "type": "Camera" }
            ] } ]
        }))
        .unwrap();
        Arc::new(Stage::compose("r.usd", &desc, &StageOpts::load_all(), &StageEdit::default()).unwrap())
    }

    fn term(stage: &StageRef, path: &str) -> Option<GeomTerm> {
        let prim = Prim::at_path(stage, &PrimPath::new(path).unwrap()).unwrap();
        GeomTerm::define_for_read(&prim, TimeCode::Default, PurposeSet::default())
    }

    #[test]
    fn test_define_for_read() {
        let stage = stage();
        assert!(matches!(term(&stage, "/geo/tri"), Some(GeomTerm::Mesh(_))));
        assert!(matches!(term(&stage, "/geo/cloud"), Some(GeomTerm::Points(_))));
        assert!(term(&stage, "/geo/broken").is_none());
        assert!(term(&stage, "/geo/cam").is_none());

        // Guide purpose is not in the default set; broken and cam drop out.
        let Some(GeomTerm::Group(children)) = term(&stage, "/geo") else {
            panic!("expected a group");
        };
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].0, DMat4::from_translation(DVec3::new(10.0, 0.0, 0.0)));
    }

    #[test]
    fn test_refine_mesh_primvars() {
        let stage = stage();
        let fragments = DefaultRefiner.refine(&term(&stage, "/geo/tri").unwrap(), &RefineParms::default());
        assert_eq!(fragments.len(), 1);
        let d = &fragments[0];
        assert_eq!(d.num_primitives(), 2);
        assert_eq!(d.num_vertices(), 6);

        let cd = d.find_attrib(AttribOwner::Primitive, "Cd").unwrap();
        assert_eq!(cd.floats(1), Some(&[1.0, 0.5, 0.0][..]));
        assert_eq!(cd.type_info(), TypeInfo::Color);
        assert_eq!(d.find_attrib(AttribOwner::Primitive, "id").unwrap().ints(1), Some(&[5][..]));
        assert!(d.find_attrib(AttribOwner::Point, "rest").unwrap().is_non_transforming());

        let uv = d.find_attrib(AttribOwner::Vertex, "uv").unwrap();
        assert_eq!(uv.tuple_size(), 3);
        assert_eq!(uv.floats(1), Some(&[1.0, 0.0, 0.0][..]));
        assert!(d.find_attrib(AttribOwner::Vertex, "st").is_none());

        let constants = d.find_attrib(AttribOwner::Detail, CONSTANT_ATTRIBS_NAME).unwrap();
        assert_eq!(constants.get_string(0), Some("Cd"));
    }

    #[test]
    fn test_refine_soup_and_filters() {
        let stage = stage();
        let parms = RefineParms::default()
            .with_poly_soup(true)
            .with_primvar_pattern("* ^Cd")
            .with_st_to_uv(false);
        let fragments = DefaultRefiner.refine(&term(&stage, "/geo/tri").unwrap(), &parms);
        let d = &fragments[0];
        assert_eq!(d.num_primitives(), 1);
        assert_eq!(d.num_faces(), 2);
        assert!(d.find_attrib(AttribOwner::Primitive, "Cd").is_none());
        assert!(d.find_attrib(AttribOwner::Detail, CONSTANT_ATTRIBS_NAME).is_none());
        assert_eq!(d.find_attrib(AttribOwner::Vertex, "st").unwrap().tuple_size(), 2);
        // Uniform values land on the soup's vertices.
        assert_eq!(d.find_attrib(AttribOwner::Vertex, "id").unwrap().ints(4), Some(&[5][..]));
    }

    #[test]
    fn test_refine_group_applies_child_transforms() {
        let stage = stage();
        let fragments = DefaultRefiner.refine(&term(&stage, "/geo").unwrap(), &RefineParms::default());
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].point(1), DVec3::new(11.0, 0.0, 0.0));
        // Non-transforming primvars keep object space values.
        let rest = fragments[0].find_attrib(AttribOwner::Point, "rest").unwrap();
        assert_eq!(rest.floats(1), Some(&[1.0, 0.0, 0.0][..]));
        assert_eq!(fragments[1].num_points(), 2);
    }

    #[test]
    fn test_unpack_direct_points_only() {
        let stage = stage();
        let parms = RefineParms::default();
        let xform = DMat4::from_translation(DVec3::new(0.0, 5.0, 0.0));
        let path = PrimPath::new("/geo/cloud").unwrap();
        let mut dest = Detail::new();

        let mesh = term(&stage, "/geo/tri").unwrap();
        assert!(!mesh.unpack_direct(&mut dest, "r.usd", &path, &xform, &parms));
        assert_eq!(dest.num_primitives(), 0);

        let cloud = term(&stage, "/geo/cloud").unwrap();
        assert!(cloud.unpack_direct(&mut dest, "r.usd", &path, &xform, &parms));
        assert_eq!(dest.num_points(), 2);
        assert_eq!(dest.point(1), DVec3::new(0.0, 5.0, 1.0));
        assert_eq!(dest.find_attrib(AttribOwner::Point, "width").unwrap().floats(1), Some(&[0.2][..]));
        let prim_paths = dest.find_attrib(AttribOwner::Primitive, PRIM_PATH_ATTRIB).unwrap();
        assert_eq!(prim_paths.get_string(0), Some("/geo/cloud"));
    }
}
