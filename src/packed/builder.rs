//! Stamping new packed primitives into a detail.

use super::handle::{PackedUsd, ViewportLod};
use crate::core::{PrimPath, PurposeSet, TimeCode};
use crate::geom::{AttribOwner, Detail};
use crate::stage::{Prim, PrimvarValues, StageCache};
use crate::util::{DMat4, Diagnostics};

/// Builder for a packed USD primitive.
///
/// ```ignore
/// let offset = PackedUsdBuilder::new("a.usd", path)
///     .frame(TimeCode::Frame(12.0))
///     .purposes(PurposeSet::DEFAULT | PurposeSet::RENDER)
///     .build(&mut detail, &cache, &diags);
/// ```
#[derive(Clone, Debug)]
pub struct PackedUsdBuilder {
    file: String,
    prim_path: PrimPath,
    src_prim_path: PrimPath,
    index: i64,
    frame: TimeCode,
    lod: Option<ViewportLod>,
    purposes: PurposeSet,
    prim: Option<Prim>,
    transform: Option<DMat4>,
}

impl PackedUsdBuilder {
    pub fn new(file: impl Into<String>, prim_path: PrimPath) -> Self {
        Self {
            file: file.into(),
            prim_path,
            src_prim_path: PrimPath::empty(),
            index: -1,
            frame: TimeCode::Default,
            lod: None,
            purposes: PurposeSet::default(),
            prim: None,
            transform: None,
        }
    }

    /// Start from an already resolved prim; its path becomes the prim path.
    pub fn from_prim(file: impl Into<String>, prim: Prim) -> Self {
        let mut b = Self::new(file, prim.path().clone());
        b.prim = Some(prim);
        b
    }

    pub fn src_prim_path(mut self, path: PrimPath) -> Self {
        self.src_prim_path = path;
        self
    }

    pub fn index(mut self, index: i64) -> Self {
        self.index = index;
        self
    }

    pub fn frame(mut self, frame: TimeCode) -> Self {
        self.frame = frame;
        self
    }

    pub fn lod(mut self, lod: ViewportLod) -> Self {
        self.lod = Some(lod);
        self
    }

    pub fn purposes(mut self, purposes: PurposeSet) -> Self {
        self.purposes = purposes;
        self
    }

    /// Use this prim instead of resolving the path. The prim path is kept.
    pub fn prim(mut self, prim: Prim) -> Self {
        self.prim = Some(prim);
        self
    }

    /// Place the primitive with this transform instead of the prim's world
    /// transform.
    pub fn transform(mut self, transform: DMat4) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Append the packed primitive to `detail`. Returns its offset.
    pub fn build(self, detail: &mut Detail, cache: &StageCache, diagnostics: &Diagnostics) -> usize {
        let mut handle = PackedUsd::new(self.file, self.prim_path, self.frame);
        handle.set_src_prim_path(self.src_prim_path);
        handle.set_index(self.index);
        if let Some(lod) = self.lod {
            handle.set_lod(lod);
        }
        handle.set_purposes(self.purposes);
        if let Some(prim) = &self.prim {
            handle.bind_prim(prim.clone());
        }
        let transform = match self.transform {
            Some(m) => m,
            None => handle.world_transform(cache, diagnostics),
        };
        let offset = detail.append_packed(handle, transform);

        if let Some(prim) = self.prim.as_ref().filter(|p| !p.is_boundable()) {
            copy_primvars(detail, offset, prim);
        }
        offset
    }
}

/// Copy the first element of each authored primvar to primitive attributes.
/// Primvars whose attribute cannot be created are skipped.
fn copy_primvars(detail: &mut Detail, offset: usize, prim: &Prim) {
    let len = detail.num_primitives();
    let attribs = detail.attribs_mut(AttribOwner::Primitive);
    for primvar in prim.primvars() {
        let n = primvar.tuple_size;
        let values = primvar.flattened();
        let created = match &values {
            PrimvarValues::Float(v) if v.len() >= n => attribs
                .add_float(&primvar.name, n, len)
                .map(|a| a.set_floats(offset, &v[..n])),
            PrimvarValues::Int(v) if v.len() >= n => attribs
                .add_int(&primvar.name, n, len)
                .map(|a| a.set_ints(offset, &v[..n])),
            PrimvarValues::String(v) if !v.is_empty() => attribs
                .add_string(&primvar.name, len)
                .map(|a| a.set_string(offset, &v[0])),
            _ => continue,
        };
        if let Err(e) = created {
            tracing::debug!("skipping primvar on {}: {e}", prim.path());
        }
    }
}
