//! Serialized scene description.
//!
//! A stage file is a JSON document holding a prim hierarchy plus named
//! instance masters. It is deliberately small: typed prims, transforms,
//! visibility, purpose, kind, payloads, variant sets, instancing, mesh and
//! points geometry and primvars.
//!
//! ```json
//! {
//!   "prims": [
//!     { "name": "geo", "type": "Xform",
//!       "xform": { "default": { "translate": [0, 1, 0] } },
//!       "children": [
//!         { "name": "box", "type": "Mesh",
//!           "points": { "default": [[0,0,0],[1,0,0],[1,1,0]] },
//!           "faceVertexCounts": [3], "faceVertexIndices": [0, 1, 2] }
//!       ] }
//!   ]
//! }
//! ```

use crate::core::{Purpose, Sampled};
use crate::stage::visibility::Visibility;
use crate::util::{DMat4, DQuat, DVec3, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Root of a stage file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StageDescription {
    pub prims: Vec<PrimDescription>,
    /// Instance masters by name; prims reference them with `instance`.
    pub masters: BTreeMap<String, Vec<PrimDescription>>,
}

impl StageDescription {
    /// Parse a JSON stage document.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read a JSON stage file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(crate::Error::FileNotFound(path.to_path_buf()));
        }
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

/// One prim and its subtree.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PrimDescription {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub active: Option<bool>,
    pub purpose: Purpose,
    pub kind: Option<String>,
    pub visibility: Option<Sampled<Visibility>>,
    pub xform: Option<Sampled<XformOps>>,
    /// Children are payload contents, composed only when loading all.
    pub payload: bool,
    /// Name of the master this prim instances.
    pub instance: Option<String>,
    pub points: Option<Sampled<Vec<[f64; 3]>>>,
    pub face_vertex_counts: Vec<i32>,
    pub face_vertex_indices: Vec<i32>,
    pub primvars: BTreeMap<String, PrimvarDescription>,
    pub variant_sets: BTreeMap<String, VariantSetDescription>,
    pub children: Vec<PrimDescription>,
}

/// A variant set: named alternatives for additional children.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VariantSetDescription {
    /// Selection used when no edit overrides it.
    pub selection: Option<String>,
    pub variants: BTreeMap<String, Vec<PrimDescription>>,
}

/// How primvar values map onto geometry elements.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Interpolation {
    #[default]
    Constant,
    Uniform,
    Vertex,
    Varying,
    FaceVarying,
}

/// Semantic role of a primvar; decides how transforms apply to it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    #[default]
    None,
    Point,
    Vector,
    Normal,
    Color,
    TexCoord,
}

/// Primvar values; the JSON array element type selects the variant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimvarValues {
    Int(Vec<i64>),
    Float(Vec<f64>),
    String(Vec<String>),
}

impl Default for PrimvarValues {
    fn default() -> Self {
        Self::Float(Vec::new())
    }
}

impl PrimvarValues {
    pub fn len(&self) -> usize {
        match self {
            Self::Int(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::String(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PrimvarDescription {
    pub interpolation: Interpolation,
    pub role: Role,
    pub tuple_size: Option<usize>,
    /// Flat values, `tuple_size` components per element.
    pub values: PrimvarValues,
    pub indices: Option<Vec<usize>>,
}

/// Transform operations of one sample, applied as `T * R * S`, or an
/// explicit row-major matrix that replaces them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct XformOps {
    pub translate: Option<[f64; 3]>,
    /// Euler angles in degrees, X applied first.
    #[serde(rename = "rotateXYZ")]
    pub rotate_xyz: Option<[f64; 3]>,
    pub scale: Option<[f64; 3]>,
    pub matrix: Option<[f64; 16]>,
}

impl XformOps {
    /// Compute the local 4x4 matrix (column-vector convention).
    pub fn matrix(&self) -> DMat4 {
        if let Some(m) = &self.matrix {
            // Row-major, row-vector data read as columns is its transpose.
            return DMat4::from_cols_array(m);
        }
        let t = self.translate.map_or(DVec3::ZERO, DVec3::from);
        let s = self.scale.map_or(DVec3::ONE, DVec3::from);
        let r = self.rotate_xyz.map_or(DQuat::IDENTITY, |[x, y, z]| {
            DQuat::from_rotation_z(z.to_radians())
                * DQuat::from_rotation_y(y.to_radians())
                * DQuat::from_rotation_x(x.to_radians())
        });
        DMat4::from_scale_rotation_translation(s, r, t)
    }
}
