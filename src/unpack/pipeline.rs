//! Unpacking packed USD primitives into concrete geometry.
//!
//! A prim is converted to a [`GeomTerm`] (shared through the context's
//! geometry cache), unpacked directly when the term supports it, and
//! otherwise refined into fragments that are merged into the destination.
//! The generic path also stamps provenance attributes on what it creates.

use super::refine::{GeomTerm, RefineParms, CONSTANT_ATTRIBS_NAME};
use super::{PATH_ATTRIB, PRIM_PATH_ATTRIB, VISIBILITY_ATTRIB, XFORM_ATTRIB};
use crate::context::Context;
use crate::core::{PrimPath, TimeCode};
use crate::geom::{AttribOwner, Detail, TypeInfo};
use crate::packed::{InstanceKey, PackedUsd};
use crate::stage::{Prim, PrimType};
use crate::util::{mat4_to_array, DMat4, Diagnostics, Error, Pattern, Severity};
use std::collections::BTreeSet;
use std::ops::Range;

impl PackedUsd {
    /// Unpack `prim` into `dest`, placed by `xform`.
    ///
    /// `source` is the detail and offset of the packed primitive being
    /// unpacked; its primitive groups are copied onto the new primitives.
    /// Returns false when the prim has no geometric form. That is reported
    /// as a warning except for the procedural types that never convert.
    #[allow(clippy::too_many_arguments)]
    #[tracing::instrument(level = "debug", skip_all, fields(prim = %prim.path()))]
    pub fn unpack_prim(
        &self,
        ctx: &Context,
        dest: &mut Detail,
        source: Option<(&Detail, usize)>,
        prim: &Prim,
        prim_path: &PrimPath,
        xform: &DMat4,
        parms: &RefineParms,
        diagnostics: &Diagnostics,
    ) -> bool {
        let (frame, purposes) = (self.frame(), self.purposes());
        let key = InstanceKey::for_prim(self.file_name(), prim, frame, purposes);
        let Some(term) = ctx
            .geometry_cache()
            .get_or_insert_with(&key, || GeomTerm::define_for_read(prim, frame, purposes))
        else {
            if !matches!(prim.prim_type(), PrimType::PxHairman | PrimType::PxProcArgs) {
                let err = Error::UnsupportedPrimType {
                    path: prim.path().to_string(),
                    type_name: prim.type_name().to_string(),
                };
                diagnostics.warn(err.to_string());
            }
            return false;
        };

        if term.unpack_direct(dest, self.file_name(), prim_path, xform, parms) {
            return true;
        }

        let first_point = dest.num_points();
        let first_prim = dest.num_primitives();

        let mut fragments = ctx.refiner().refine(&term, parms);
        mark_non_transforming(&mut fragments, &Pattern::new(&parms.non_transforming_pattern));
        let constants = accumulate_constant_attribs(dest, &mut fragments);

        for fragment in &mut fragments {
            if let Some((src, offset)) = source {
                let all = 0..fragment.num_primitives();
                for group in src.groups_containing(offset) {
                    fragment.add_to_prim_group(&group, all.clone());
                }
            }
            dest.merge(fragment, Some(xform));
        }

        let prims = first_prim..dest.num_primitives();
        let points = first_point..dest.num_points();
        if !prims.is_empty() {
            if parms.add_path_attrib {
                stamp_string(dest, PATH_ATTRIB, &prims, self.file_name());
            }
            if parms.add_prim_path_attrib {
                stamp_string(dest, PRIM_PATH_ATTRIB, &prims, prim.path().as_str());
            }
        }
        if !constants.is_empty() {
            if let Ok(attrib) = dest.attribs_mut(AttribOwner::Detail).add_string(CONSTANT_ATTRIBS_NAME, 1) {
                attrib.set_string(0, &constants);
            }
        }
        if parms.add_xform_attrib && !points.is_empty() {
            record_xform(dest, points, xform);
        }
        if parms.add_visibility_attrib && !prims.is_empty() {
            record_visibility(dest, prims, prim, frame);
        }
        true
    }

    /// Unpack the handle's own prim with soups disabled.
    pub fn unpack_geometry(
        &self,
        ctx: &Context,
        dest: &mut Detail,
        source: Option<(&Detail, usize)>,
        transform: &DMat4,
        parms: &RefineParms,
        diagnostics: &Diagnostics,
    ) -> bool {
        let Some(prim) = self.resolve(ctx.stage_cache(), diagnostics, Severity::Warning) else {
            diagnostics.warn("Invalid prim found");
            return false;
        };
        let parms = RefineParms { allow_poly_soup: false, ..parms.clone() };
        self.unpack_prim(ctx, dest, source, &prim, self.prim_path(), transform, &parms, diagnostics)
    }

    /// Unpack every primvar, `st` as `uv`, with `rest` kept in object space.
    pub fn unpack(&self, ctx: &Context, dest: &mut Detail, transform: Option<&DMat4>, diagnostics: &Diagnostics) -> bool {
        let transform = transform.copied().unwrap_or(DMat4::IDENTITY);
        self.unpack_geometry(ctx, dest, None, &transform, &RefineParms::default(), diagnostics)
    }

    /// Unpack in place of the packed primitive at `source`, using its full
    /// transform.
    ///
    /// # Panics
    /// If the source offset is not a packed primitive.
    pub fn unpack_using_polygons(
        &self,
        ctx: &Context,
        dest: &mut Detail,
        source: Option<(&Detail, usize)>,
        diagnostics: &Diagnostics,
    ) -> bool {
        let xform = source.map_or(DMat4::IDENTITY, |(detail, offset)| detail.packed_transform(offset));
        self.unpack_geometry(ctx, dest, source, &xform, &RefineParms::default(), diagnostics)
    }

    /// Like [`unpack`](Self::unpack), copying groups from `source`.
    pub fn unpack_with_prim(
        &self,
        ctx: &Context,
        dest: &mut Detail,
        transform: Option<&DMat4>,
        source: Option<(&Detail, usize)>,
        diagnostics: &Diagnostics,
    ) -> bool {
        let transform = transform.copied().unwrap_or(DMat4::IDENTITY);
        self.unpack_geometry(ctx, dest, source, &transform, &RefineParms::default(), diagnostics)
    }
}

const ALL_OWNERS: [AttribOwner; 4] =
    [AttribOwner::Point, AttribOwner::Vertex, AttribOwner::Primitive, AttribOwner::Detail];

fn mark_non_transforming(fragments: &mut [Detail], pattern: &Pattern) {
    if pattern.is_empty() {
        return;
    }
    for fragment in fragments {
        for owner in ALL_OWNERS {
            for attrib in fragment.attribs_mut(owner).iter_mut() {
                if pattern.matches(attrib.name()) {
                    attrib.set_non_transforming(true);
                }
            }
        }
    }
}

/// Take the constant-attribute lists off `dest` and every fragment and
/// return their sorted union, space separated.
fn accumulate_constant_attribs(dest: &mut Detail, fragments: &mut [Detail]) -> String {
    let mut names = BTreeSet::new();
    for detail in std::iter::once(dest).chain(fragments.iter_mut()) {
        let Some(attrib) = detail.attribs_mut(AttribOwner::Detail).remove(CONSTANT_ATTRIBS_NAME) else {
            continue;
        };
        if let Some(list) = attrib.get_string(0) {
            names.extend(list.split_whitespace().map(str::to_string));
        }
    }
    names.into_iter().collect::<Vec<_>>().join(" ")
}

fn stamp_string(dest: &mut Detail, name: &str, prims: &Range<usize>, value: &str) {
    let len = dest.num_primitives();
    match dest.attribs_mut(AttribOwner::Primitive).add_string(name, len) {
        Ok(attrib) => {
            for offset in prims.clone() {
                attrib.set_string(offset, value);
            }
        }
        Err(e) => tracing::warn!("{e}"),
    }
}

/// Record the applied transform on the new points so it can be inverted
/// later. Points that predate the attribute get identity.
fn record_xform(dest: &mut Detail, points: Range<usize>, xform: &DMat4) {
    let len = dest.num_points();
    let attribs = dest.attribs_mut(AttribOwner::Point);
    let created = !attribs.contains(XFORM_ATTRIB);
    let attrib = match attribs.add_float(XFORM_ATTRIB, 16, len) {
        Ok(a) => a,
        Err(e) => {
            tracing::warn!("{e}");
            return;
        }
    };
    if created {
        attrib.set_type_info(TypeInfo::Matrix);
        attrib.set_non_transforming(true);
        let identity = mat4_to_array(&DMat4::IDENTITY);
        for offset in 0..points.start {
            attrib.set_floats(offset, &identity);
        }
    }
    let values = mat4_to_array(xform);
    for offset in points {
        attrib.set_floats(offset, &values);
    }
}

/// Record authored visibility on the new primitives. Nothing is written
/// when the prim does not author visibility.
fn record_visibility(dest: &mut Detail, prims: Range<usize>, prim: &Prim, frame: TimeCode) {
    if !prim.has_authored_visibility() {
        return;
    }
    let token = prim.authored_visibility(frame).unwrap_or_default().as_token();
    stamp_string(dest, VISIBILITY_ATTRIB, &prims, token);
}
