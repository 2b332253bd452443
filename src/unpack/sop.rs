//! The unpack operator.
//!
//! Expands packed USD primitives (or points referencing prims) into the
//! prims found by a named traversal. The result is new packed primitives,
//! polygons or reference points, optionally replacing the inputs.
//!
//! Parameters:
//! - `unpack_group` - elements to unpack: offsets, `a-b` ranges or primitive group names
//! - `unpack_class` - `primitives` (0) or `points` (1)
//! - `unpack_delold` - delete the inputs that bound to a prim (default on)
//! - `unpack_time` - frame for point inputs, which carry no frame of their own
//! - `unpack_traversal` - traversal name, `none` for no traversal
//! - `unpack_geomtype` - `packedprims` or `polygons`
//! - `unpack_pathattrib` / `unpack_nameattrib` - primitive attributes naming the source prim
//! - `transfer_attrs` - input attributes copied onto the new elements
//! - `import_primvars`, `nontransformingprimvars`, `translatesttouv` - polygon conversion

use super::refine::RefineParms;
use super::traversal::{traverse_for_unpack, TraverseRequest};
use super::{PATH_ATTRIB, PRIM_PATH_ATTRIB};
use crate::context::Context;
use crate::core::{remap_array, DefaultArray, PrimPath, PurposeSet, TimeCode};
use crate::geom::{AttribOwner, Detail, INVALID_STRING_INDEX};
use crate::packed::{PackedUsd, PackedUsdBuilder};
use crate::parms::ParmEvaluator;
use crate::stage::{Prim, StageOpts};
use crate::traverse::{TraversalResult, NO_TRAVERSE_NAME};
use crate::util::{DMat4, Diagnostics, Error, Pattern, Result, Severity};
use std::collections::{BTreeSet, HashMap};
use std::ops::Range;

// ============================================================================
// Parameters
// ============================================================================

/// Which elements of the input are unpacked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UnpackClass {
    /// Packed USD primitives.
    #[default]
    Primitives,
    /// Points carrying `usdpath`/`usdprimpath` string attributes.
    Points,
}

impl UnpackClass {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "primitives" | "0" => Some(Self::Primitives),
            "points" | "1" => Some(Self::Points),
            _ => None,
        }
    }

    fn owner(self) -> AttribOwner {
        match self {
            Self::Primitives => AttribOwner::Primitive,
            Self::Points => AttribOwner::Point,
        }
    }
}

/// What packed primitives are expanded into.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GeomType {
    #[default]
    PackedPrims,
    Polygons,
}

impl GeomType {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "packedprims" => Some(Self::PackedPrims),
            "polygons" => Some(Self::Polygons),
            _ => None,
        }
    }
}

/// Evaluated operator parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct UnpackParms {
    pub group: String,
    pub class: UnpackClass,
    pub delete_old: bool,
    pub time: f64,
    pub traversal: String,
    pub geom_type: GeomType,
    pub path_attrib: String,
    pub name_attrib: String,
    pub transfer_attrs: String,
    pub import_primvars: String,
    pub non_transforming_primvars: String,
    pub translate_st_to_uv: bool,
}

impl UnpackParms {
    /// Evaluate every parameter at `time`. `unpack_time` defaults to `time`.
    pub fn eval(parms: &dyn ParmEvaluator, time: f64) -> Result<Self> {
        let class = parms.string_or("unpack_class", time, "primitives");
        let class = UnpackClass::from_token(&class)
            .ok_or_else(|| Error::parm("unpack_class", format!("unknown class '{class}'")))?;
        let geom_type = parms.string_or("unpack_geomtype", time, "packedprims");
        let geom_type = GeomType::from_token(&geom_type)
            .ok_or_else(|| Error::parm("unpack_geomtype", format!("unknown geometry type '{geom_type}'")))?;
        let defaults = RefineParms::default();

        Ok(Self {
            group: parms.string_or("unpack_group", time, ""),
            class,
            delete_old: parms.bool_or("unpack_delold", time, true),
            time: parms.float_or("unpack_time", time, time),
            traversal: parms.string_or("unpack_traversal", time, crate::traverse::GPRIM_TRAVERSE_NAME),
            geom_type,
            path_attrib: parms.string_or("unpack_pathattrib", time, "path"),
            name_attrib: parms.string_or("unpack_nameattrib", time, "name"),
            transfer_attrs: parms.string_or("transfer_attrs", time, ""),
            import_primvars: parms.string_or("import_primvars", time, &defaults.primvar_pattern),
            non_transforming_primvars: parms.string_or(
                "nontransformingprimvars",
                time,
                &defaults.non_transforming_pattern,
            ),
            translate_st_to_uv: parms.bool_or("translatesttouv", time, defaults.translate_st_to_uv),
        })
    }

    pub fn refine_parms(&self) -> RefineParms {
        RefineParms::default()
            .with_primvar_pattern(self.import_primvars.clone())
            .with_st_to_uv(self.translate_st_to_uv)
            .with_non_transforming_pattern(self.non_transforming_primvars.clone())
    }

    fn to_polygons(&self) -> bool {
        self.geom_type == GeomType::Polygons
    }
}

/// Resolve a group string to sorted, unique element offsets.
///
/// An empty string selects everything. Tokens are offsets, inclusive
/// `a-b` ranges, or (for primitives) primitive group names.
pub fn select_elements(detail: &Detail, group: &str, class: UnpackClass) -> Result<Vec<usize>> {
    let count = detail.element_count(class.owner());
    if group.trim().is_empty() {
        return Ok((0..count).collect());
    }
    let check = |offset: usize| {
        if offset < count {
            Ok(offset)
        } else {
            Err(Error::OffsetOutOfBounds { offset, count })
        }
    };

    let mut selected = BTreeSet::new();
    for token in group.split_whitespace() {
        if let Ok(offset) = token.parse::<usize>() {
            selected.insert(check(offset)?);
            continue;
        }
        if let Some((a, b)) = token.split_once('-') {
            if let (Ok(a), Ok(b)) = (a.parse::<usize>(), b.parse::<usize>()) {
                let (lo, hi) = (a.min(b), a.max(b));
                check(hi)?;
                selected.extend(lo..=hi);
                continue;
            }
        }
        let members = match class {
            UnpackClass::Primitives => detail.prim_group(token),
            UnpackClass::Points => None,
        };
        let Some(members) = members else {
            return Err(Error::parm("unpack_group", format!("unknown group '{token}'")));
        };
        selected.extend(members.iter().copied());
    }
    Ok(selected.into_iter().collect())
}

// ============================================================================
// Operator
// ============================================================================

/// Roots bound from the selected input elements, one slot per element.
struct BoundRoots {
    offsets: Vec<usize>,
    roots: Vec<Option<Prim>>,
    files: Vec<String>,
    /// Root paths that select variants, empty otherwise.
    variants: Vec<PrimPath>,
    times: DefaultArray<TimeCode>,
    purposes: DefaultArray<PurposeSet>,
}

/// The unpack operator, bound to the context whose caches it uses.
#[derive(Clone, Copy)]
pub struct UnpackUsd<'a> {
    ctx: &'a Context,
}

impl<'a> UnpackUsd<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }

    /// Cook `input` into a new detail.
    ///
    /// Data problems (unbound roots, unconvertible prims) are reported into
    /// `diagnostics`. Bad parameters, missing reference attributes and
    /// unknown traversals fail the cook.
    #[tracing::instrument(level = "debug", skip_all, fields(time = time))]
    pub fn cook(
        &self,
        input: &Detail,
        parms: &dyn ParmEvaluator,
        time: f64,
        diagnostics: &Diagnostics,
    ) -> Result<Detail> {
        let p = UnpackParms::eval(parms, time)?;
        if p.traversal == NO_TRAVERSE_NAME && !p.to_polygons() {
            return Ok(input.clone());
        }

        let offsets = select_elements(input, &p.group, p.class)?;
        let mut bound = match p.class {
            UnpackClass::Primitives => self.bind_packed(input, offsets, diagnostics),
            UnpackClass::Points => self.bind_points(input, offsets, diagnostics)?,
        };
        if !bound.times.is_varying() {
            bound.times.set_constant(TimeCode::from_numeric(p.time));
        }

        let request = TraverseRequest { roots: &bound.roots, times: &bound.times, purposes: &bound.purposes };
        let found = traverse_for_unpack(
            self.ctx.traversals(),
            &p.traversal,
            &request,
            p.to_polygons(),
            parms,
            time,
            diagnostics,
        )?;
        tracing::debug!(roots = bound.roots.len(), found = found.len(), "traversal complete");

        let mut gdp = input.clone();
        let transfer = transfer_filter(&p.transfer_attrs);
        {
            let _span = tracing::info_span!("expand", count = found.len()).entered();
            match p.class {
                UnpackClass::Points => self.expand_ref_points(&mut gdp, input, &bound, &found, &transfer),
                UnpackClass::Primitives => {
                    let variants = remap_array(&found, &bound.variants, &PrimPath::empty());
                    let times = bound.times.remapped(&found);
                    let expansion = Expansion { bound: &bound, found: &found, variants: &variants, times: &times };
                    match p.geom_type {
                        GeomType::PackedPrims => {
                            self.expand_packed(&mut gdp, input, &expansion, &transfer, diagnostics)
                        }
                        GeomType::Polygons => self.expand_polygons(
                            &mut gdp,
                            input,
                            &expansion,
                            &transfer,
                            &p.refine_parms(),
                            diagnostics,
                        ),
                    }
                }
            }
        }

        if p.delete_old {
            delete_bound(&mut gdp, &bound, p.class);
        }
        name_and_path_pass(&mut gdp, &p.path_attrib, &p.name_attrib, diagnostics);
        Ok(gdp)
    }

    // ------------------------------------------------------------------------
    // Binding
    // ------------------------------------------------------------------------

    fn bind_packed(&self, input: &Detail, offsets: Vec<usize>, diagnostics: &Diagnostics) -> BoundRoots {
        let n = offsets.len();
        let mut roots = Vec::with_capacity(n);
        let mut files = Vec::with_capacity(n);
        let mut variants = Vec::with_capacity(n);
        let mut times = Vec::with_capacity(n);
        let mut purposes = Vec::with_capacity(n);
        for &offset in &offsets {
            match input.packed(offset).map(|p| p.handle()) {
                Some(handle) => {
                    roots.push(handle.resolve(self.ctx.stage_cache(), diagnostics, Severity::Warning));
                    files.push(handle.file_name().to_string());
                    variants.push(if handle.prim_path().has_variants() {
                        handle.prim_path().clone()
                    } else {
                        PrimPath::empty()
                    });
                    times.push(handle.frame());
                    purposes.push(handle.purposes());
                }
                None => {
                    roots.push(None);
                    files.push(String::new());
                    variants.push(PrimPath::empty());
                    times.push(TimeCode::Default);
                    purposes.push(PurposeSet::default());
                }
            }
        }
        BoundRoots {
            offsets,
            roots,
            files,
            variants,
            times: DefaultArray::varying(TimeCode::Default, times),
            purposes: DefaultArray::varying(PurposeSet::default(), purposes),
        }
    }

    fn bind_points(&self, input: &Detail, offsets: Vec<usize>, diagnostics: &Diagnostics) -> Result<BoundRoots> {
        let string_attrib = |name: &str| {
            input
                .find_attrib(AttribOwner::Point, name)
                .filter(|a| a.strings().is_some())
                .ok_or_else(|| Error::MissingAttribute { owner: AttribOwner::Point.name(), name: name.to_string() })
        };
        let file_attrib = string_attrib(PATH_ATTRIB)?;
        let path_attrib = string_attrib(PRIM_PATH_ATTRIB)?;

        let mut requests = Vec::new();
        let mut slots = Vec::new();
        let mut files = Vec::with_capacity(offsets.len());
        for (slot, &offset) in offsets.iter().enumerate() {
            let file = file_attrib.get_string(offset).unwrap_or_default();
            let path = path_attrib.get_string(offset).unwrap_or_default();
            files.push(file.to_string());
            if file.is_empty() || path.is_empty() {
                continue;
            }
            match PrimPath::new(path) {
                Ok(path) => {
                    requests.push((file.to_string(), path));
                    slots.push(slot);
                }
                Err(e) => diagnostics.warn(e.to_string()),
            }
        }

        let bound = self.ctx.stage_cache().bind_prims(
            &requests,
            &StageOpts::load_all(),
            diagnostics,
            Severity::Warning,
        );
        let mut roots: Vec<Option<Prim>> = vec![None; offsets.len()];
        for (slot, prim) in slots.into_iter().zip(bound) {
            roots[slot] = prim;
        }
        let variants = vec![PrimPath::empty(); offsets.len()];
        Ok(BoundRoots {
            offsets,
            roots,
            files,
            variants,
            times: DefaultArray::new(TimeCode::Default),
            purposes: DefaultArray::new(PurposeSet::default()),
        })
    }

    // ------------------------------------------------------------------------
    // Expansion
    // ------------------------------------------------------------------------

    fn expand_packed(
        &self,
        gdp: &mut Detail,
        input: &Detail,
        ex: &Expansion<'_>,
        transfer: &Pattern,
        diagnostics: &Diagnostics,
    ) {
        for (i, (prim, origin)) in ex.found.iter().enumerate() {
            let Some((offset, root, root_handle)) = ex.root(input, *origin) else { continue };
            let frame = *ex.times.get(i);
            let xform = input.packed_transform(offset) * relative_transform(root, prim, frame);
            let new = PackedUsdBuilder::new(root_handle.file_name(), ex.prim_path(i, root, prim))
                .src_prim_path(root_handle.prim_path().clone())
                .frame(frame)
                .lod(root_handle.lod())
                .purposes(*ex.bound.purposes.get(*origin))
                .prim(prim.clone())
                .transform(xform)
                .build(gdp, self.ctx.stage_cache(), diagnostics);
            transfer_attribs(gdp, input, AttribOwner::Primitive, offset, new..new + 1, transfer);
        }
    }

    fn expand_polygons(
        &self,
        gdp: &mut Detail,
        input: &Detail,
        ex: &Expansion<'_>,
        transfer: &Pattern,
        refine: &RefineParms,
        diagnostics: &Diagnostics,
    ) {
        for (i, (prim, origin)) in ex.found.iter().enumerate() {
            let Some((offset, root, root_handle)) = ex.root(input, *origin) else { continue };
            let frame = *ex.times.get(i);
            let xform = input.packed_transform(offset) * relative_transform(root, prim, frame);

            let mut handle = PackedUsd::new(root_handle.file_name(), ex.prim_path(i, root, prim), frame);
            handle.set_purposes(*ex.bound.purposes.get(*origin));
            handle.bind_prim(prim.clone());

            let first = gdp.num_primitives();
            if handle.unpack_geometry(self.ctx, gdp, Some((input, offset)), &xform, refine, diagnostics) {
                let created = first..gdp.num_primitives();
                transfer_attribs(gdp, input, AttribOwner::Primitive, offset, created, transfer);
            }
        }
    }

    fn expand_ref_points(
        &self,
        gdp: &mut Detail,
        input: &Detail,
        bound: &BoundRoots,
        found: &TraversalResult,
        transfer: &Pattern,
    ) {
        for (prim, origin) in found {
            let Some(root) = bound.roots[*origin].as_ref() else { continue };
            let offset = bound.offsets[*origin];
            let frame = *bound.times.get(*origin);
            let placed = DMat4::from_translation(input.point(offset)) * relative_transform(root, prim, frame);
            let new = gdp.append_point(placed.w_axis.truncate());

            transfer_attribs(gdp, input, AttribOwner::Point, offset, new..new + 1, transfer);
            let len = gdp.num_points();
            let attribs = gdp.attribs_mut(AttribOwner::Point);
            for (name, value) in [(PATH_ATTRIB, bound.files[*origin].as_str()), (PRIM_PATH_ATTRIB, prim.path().as_str())] {
                match attribs.add_string(name, len) {
                    Ok(attrib) => attrib.set_string(new, value),
                    Err(e) => tracing::warn!("{e}"),
                }
            }
        }
    }
}

/// Traversal results of a primitive unpack, with per-result variants and times.
struct Expansion<'b> {
    bound: &'b BoundRoots,
    found: &'b TraversalResult,
    variants: &'b [PrimPath],
    times: &'b DefaultArray<TimeCode>,
}

impl<'b> Expansion<'b> {
    fn root<'d>(&self, input: &'d Detail, origin: usize) -> Option<(usize, &'b Prim, &'d PackedUsd)> {
        let root = self.bound.roots[origin].as_ref()?;
        let offset = self.bound.offsets[origin];
        let handle = input.packed(offset)?.handle();
        Some((offset, root, handle))
    }

    /// Path for result `i`, carrying the root's variant selections.
    fn prim_path(&self, i: usize, root: &Prim, prim: &Prim) -> PrimPath {
        let variant = &self.variants[i];
        if variant.is_empty() {
            return prim.path().clone();
        }
        prim.path().replace_prefix(root.path(), variant).unwrap_or_else(|| prim.path().clone())
    }
}

/// Transform from `root` space to `prim` space at `frame`.
fn relative_transform(root: &Prim, prim: &Prim, frame: TimeCode) -> DMat4 {
    let cache = prim.stage().xform_cache();
    let root_world = cache.local_to_world(root, frame);
    let prim_world = cache.local_to_world(prim, frame);
    if root_world.determinant().abs() <= f64::EPSILON {
        return prim_world;
    }
    root_world.inverse() * prim_world
}

/// Names matched by `transfer_attrs`, public attributes only.
fn transfer_filter(pattern: &str) -> Pattern {
    Pattern::new(&format!("{pattern} ^__*"))
}

fn transfer_attribs(
    gdp: &mut Detail,
    input: &Detail,
    owner: AttribOwner,
    src: usize,
    dest: Range<usize>,
    filter: &Pattern,
) {
    if dest.is_empty() {
        return;
    }
    let len = gdp.element_count(owner);
    let attribs = gdp.attribs_mut(owner);
    for attrib in input.attribs(owner).iter() {
        if !filter.matches(attrib.name()) {
            continue;
        }
        match attribs.add(attrib.name(), attrib.data(), len) {
            Ok(target) => {
                for elem in dest.clone() {
                    target.copy_element(elem, attrib, src);
                }
            }
            Err(e) => tracing::debug!("not transferring: {e}"),
        }
    }
}

/// Delete the input elements that bound to a prim.
fn delete_bound(gdp: &mut Detail, bound: &BoundRoots, class: UnpackClass) {
    let doomed: Vec<usize> = bound
        .offsets
        .iter()
        .zip(&bound.roots)
        .filter(|(_, root)| root.is_some())
        .map(|(&offset, _)| offset)
        .collect();
    match class {
        UnpackClass::Primitives => gdp.destroy_primitives(&doomed, true),
        UnpackClass::Points => {
            gdp.destroy_points(&doomed);
        }
    }
}

/// Fill the path and name primitive attributes.
///
/// Primitives unpacked to polygons take their path from `usdprimpath`, and
/// their name from its last component. Names are derived once per distinct
/// path string. Packed primitives use their own prim path.
fn name_and_path_pass(gdp: &mut Detail, path_name: &str, name_name: &str, diagnostics: &Diagnostics) {
    let len = gdp.num_primitives();
    let wanted = |name: &str, gdp: &mut Detail| {
        if name.is_empty() {
            return false;
        }
        match gdp.attribs_mut(AttribOwner::Primitive).add_string(name, len) {
            Ok(_) => true,
            Err(e) => {
                diagnostics.warn(e.to_string());
                false
            }
        }
    };
    let has_path = wanted(path_name, gdp);
    let has_name = wanted(name_name, gdp);
    if !has_path && !has_name {
        return;
    }

    let prim_paths = gdp
        .find_attrib(AttribOwner::Primitive, PRIM_PATH_ATTRIB)
        .and_then(|a| a.strings())
        .cloned();
    let attribs = gdp.attribs_mut(AttribOwner::Primitive);
    if let Some(prim_paths) = &prim_paths {
        if has_path {
            if let Some(col) = attribs.find_mut(path_name).and_then(|a| a.strings_mut()) {
                for offset in 0..len {
                    match prim_paths.get(offset) {
                        Some(path) => col.set_string(offset, path),
                        None => col.set_index(offset, INVALID_STRING_INDEX),
                    }
                }
            }
        }
        if has_name {
            if let Some(col) = attribs.find_mut(name_name).and_then(|a| a.strings_mut()) {
                let mut names: HashMap<i32, i32> = HashMap::new();
                for offset in 0..len {
                    let path_idx = prim_paths.string_index(offset);
                    if path_idx == INVALID_STRING_INDEX {
                        continue;
                    }
                    let name_idx = match names.get(&path_idx) {
                        Some(&idx) => idx,
                        None => {
                            let path = prim_paths.lookup_string(path_idx).unwrap_or_default();
                            let name = path.rsplit('/').next().unwrap_or(path);
                            let idx = col.add_string(name);
                            names.insert(path_idx, idx);
                            idx
                        }
                    };
                    col.set_index(offset, name_idx);
                }
            }
        }
    }

    let packed: Vec<(usize, PrimPath)> = gdp
        .packed_offsets()
        .into_iter()
        .filter_map(|o| gdp.packed(o).map(|p| (o, p.handle().prim_path().clone())))
        .collect();
    let attribs = gdp.attribs_mut(AttribOwner::Primitive);
    for (offset, path) in packed {
        if has_path {
            if let Some(a) = attribs.find_mut(path_name) {
                a.set_string(offset, path.as_str());
            }
        }
        if has_name {
            if let Some(a) = attribs.find_mut(name_name) {
                a.set_string(offset, path.name());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parms::ParmMap;
    use crate::stage::{MemoryStageOpener, StageCache, StageDescription};
    use crate::util::DVec3;
    use serde_json::json;
    use std::sync::Arc;

    fn context() -> Context {
        let opener = MemoryStageOpener::new();
        let tri = json!({ "default": [[0,0,0],[1,0,0],[0,1,0]] });
        let desc: StageDescription = serde_json::from_value(json!({
            "prims": [ { "name": "world", "type": "Xform", "kind": "assembly",
                "xform": { "default": { "translate": [10, 0, 0] } },
                "children": [
                    { "name": "a", "type": "Xform", "kind": "component",
                      "xform": { "default": { "translate": [0, 1, 0] } },
                      "children": [ { "name": "geo", "type": "Mesh", "points": tri,
                          "faceVertexCounts": [3], "faceVertexIndices": [0, 1, 2] } ] },
                    { "name": "b", "type": "Xform", "kind": "component",
                      "children": [ { "name": "geo", "type": "Mesh", "points": tri,
                          "faceVertexCounts": [3], "faceVertexIndices": [0, 1, 2] } ] }
                ] } ]
        }))
        .unwrap();
        opener.insert("s.usd", desc);
        Context::new(Arc::new(StageCache::new(Arc::new(opener))))
    }

    fn packed_input(ctx: &Context, paths: &[&str]) -> Detail {
        let diags = Diagnostics::new();
        let mut input = Detail::new();
        for path in paths {
            PackedUsdBuilder::new("s.usd", PrimPath::new(path).unwrap()).build(&mut input, ctx.stage_cache(), &diags);
        }
        input
    }

    fn prim_string(detail: &Detail, attrib: &str, offset: usize) -> Option<String> {
        detail.find_attrib(AttribOwner::Primitive, attrib)?.get_string(offset).map(str::to_string)
    }

    #[test]
    fn test_parms_defaults() {
        let p = UnpackParms::eval(&ParmMap::new(), 24.0).unwrap();
        assert_eq!(p.class, UnpackClass::Primitives);
        assert_eq!(p.geom_type, GeomType::PackedPrims);
        assert!(p.delete_old);
        assert_eq!(p.time, 24.0);
        assert_eq!(p.traversal, "std:boundable");
        assert_eq!((p.path_attrib.as_str(), p.name_attrib.as_str()), ("path", "name"));
        assert_eq!(p.refine_parms(), RefineParms::default());

        let p = UnpackParms::eval(&ParmMap::new().with("unpack_class", 1i64), 0.0).unwrap();
        assert_eq!(p.class, UnpackClass::Points);
        assert!(UnpackParms::eval(&ParmMap::new().with("unpack_geomtype", "curves"), 0.0).is_err());
    }

    #[test]
    fn test_select_elements() {
        let mut d = Detail::new();
        for _ in 0..6 {
            d.append_point(DVec3::ZERO);
        }
        for i in 0..6 {
            d.append_polygon(&[i]);
        }
        d.add_to_prim_group("left", [0, 1]);

        assert_eq!(select_elements(&d, "", UnpackClass::Primitives).unwrap(), (0..6).collect::<Vec<_>>());
        assert_eq!(select_elements(&d, "4 left 2-3 1", UnpackClass::Primitives).unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(select_elements(&d, "5-4", UnpackClass::Points).unwrap(), vec![4, 5]);
        assert!(matches!(
            select_elements(&d, "9", UnpackClass::Primitives),
            Err(Error::OffsetOutOfBounds { offset: 9, count: 6 })
        ));
        assert!(select_elements(&d, "left", UnpackClass::Points).is_err());
        assert!(select_elements(&d, "right", UnpackClass::Primitives).is_err());
    }

    #[test]
    fn test_none_packed_passes_input_through() {
        let ctx = context();
        let input = packed_input(&ctx, &["/world", "/world/a"]);
        let parms = ParmMap::new().with("unpack_traversal", "none");
        let out = UnpackUsd::new(&ctx).cook(&input, &parms, 0.0, &Diagnostics::new()).unwrap();
        assert_eq!(out.num_primitives(), 2);
        assert_eq!(out.topology_serial(), input.topology_serial());
        assert!(out.find_attrib(AttribOwner::Primitive, "path").is_none());
    }

    #[test]
    fn test_unpack_components_to_packed() {
        let ctx = context();
        let mut input = packed_input(&ctx, &["/world"]);
        // Move the root: children follow it.
        input.set_packed_transform(0, DMat4::from_translation(DVec3::new(0.0, 0.0, 5.0)));
        input.attribs_mut(AttribOwner::Primitive).add_float("Cd", 3, 1).unwrap().set_floats(0, &[1.0, 0.5, 0.0]);
        input.attribs_mut(AttribOwner::Primitive).add_int("__hidden", 1, 1).unwrap();

        let parms = ParmMap::new().with("unpack_traversal", "std:components").with("transfer_attrs", "*");
        let diags = Diagnostics::new();
        let out = UnpackUsd::new(&ctx).cook(&input, &parms, 0.0, &diags).unwrap();

        assert_eq!(out.num_primitives(), 2);
        let a = out.packed(0).unwrap();
        assert_eq!(a.handle().prim_path().as_str(), "/world/a");
        assert_eq!(a.handle().src_prim_path().as_str(), "/world");
        assert_eq!(out.packed_transform(0).w_axis.truncate(), DVec3::new(0.0, 1.0, 5.0));
        assert_eq!(out.packed_transform(1).w_axis.truncate(), DVec3::new(0.0, 0.0, 5.0));

        assert_eq!(prim_string(&out, "path", 1).as_deref(), Some("/world/b"));
        assert_eq!(prim_string(&out, "name", 0).as_deref(), Some("a"));
        let cd = out.find_attrib(AttribOwner::Primitive, "Cd").unwrap();
        assert_eq!(cd.floats(1), Some(&[1.0, 0.5, 0.0][..]));
        let hidden = out.find_attrib(AttribOwner::Primitive, "__hidden").unwrap();
        assert_eq!(hidden.ints(1), Some(&[0][..]));
        assert!(diags.is_empty());
    }

    #[test]
    fn test_keep_old_and_unbound_roots() {
        let ctx = context();
        let input = packed_input(&ctx, &["/world", "/missing"]);
        let parms = ParmMap::new()
            .with("unpack_traversal", "std:components")
            .with("unpack_delold", false);
        let diags = Diagnostics::new();
        let out = UnpackUsd::new(&ctx).cook(&input, &parms, 0.0, &diags).unwrap();
        assert_eq!(out.num_primitives(), 4);
        assert!(!diags.is_empty());

        // With delete on, only the bound root goes.
        let parms = ParmMap::new().with("unpack_traversal", "std:components");
        let out = UnpackUsd::new(&ctx).cook(&input, &parms, 0.0, &Diagnostics::new()).unwrap();
        assert_eq!(out.num_primitives(), 3);
        assert_eq!(out.packed(0).unwrap().handle().prim_path().as_str(), "/missing");
    }

    #[test]
    fn test_unpack_to_polygons_names() {
        let ctx = context();
        let input = packed_input(&ctx, &["/world"]);
        let parms = ParmMap::new().with("unpack_traversal", "none").with("unpack_geomtype", "polygons");
        let diags = Diagnostics::new();
        let out = UnpackUsd::new(&ctx).cook(&input, &parms, 0.0, &diags).unwrap();

        assert_eq!(out.num_primitives(), 2);
        assert_eq!(out.num_points(), 6);
        assert_eq!(out.point(0), DVec3::new(10.0, 1.0, 0.0));
        assert_eq!(prim_string(&out, "path", 0).as_deref(), Some("/world/a/geo"));
        assert_eq!(prim_string(&out, "path", 1).as_deref(), Some("/world/b/geo"));

        let names = out.find_attrib(AttribOwner::Primitive, "name").unwrap();
        assert_eq!(names.get_string(0), Some("geo"));
        assert_eq!(names.get_string(1), Some("geo"));
        assert_eq!(names.strings().unwrap().table_len(), 1);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_unpack_points() {
        let ctx = context();
        let mut input = Detail::new();
        input.append_points(&[DVec3::ZERO, DVec3::ZERO]);
        let points = input.attribs_mut(AttribOwner::Point);
        let files = points.add_string(PATH_ATTRIB, 2).unwrap();
        files.set_string(0, "s.usd");
        files.set_string(1, "s.usd");
        let paths = points.add_string(PRIM_PATH_ATTRIB, 2).unwrap();
        paths.set_string(0, "/world");
        paths.set_string(1, "/nope");

        let parms = ParmMap::new()
            .with("unpack_class", "points")
            .with("unpack_traversal", "std:components");
        let diags = Diagnostics::new();
        let out = UnpackUsd::new(&ctx).cook(&input, &parms, 0.0, &diags).unwrap();

        assert_eq!(out.num_points(), 3);
        assert_eq!(out.point(1), DVec3::new(0.0, 1.0, 0.0));
        let prim_paths = out.find_attrib(AttribOwner::Point, PRIM_PATH_ATTRIB).unwrap();
        assert_eq!(prim_paths.get_string(0), Some("/nope"));
        assert_eq!(prim_paths.get_string(1), Some("/world/a"));
        assert_eq!(prim_paths.get_string(2), Some("/world/b"));
        assert_eq!(diags.count_matching("/nope"), 1);
    }

    #[test]
    fn test_points_need_reference_attribs() {
        let ctx = context();
        let mut input = Detail::new();
        input.append_point(DVec3::ZERO);
        let parms = ParmMap::new().with("unpack_class", "points");
        let err = UnpackUsd::new(&ctx).cook(&input, &parms, 0.0, &Diagnostics::new()).unwrap_err();
        assert!(matches!(err, Error::MissingAttribute { ref name, .. } if name == PATH_ATTRIB));
    }

    #[test]
    fn test_unknown_traversal_fails_cook() {
        let ctx = context();
        let input = packed_input(&ctx, &["/world"]);
        let diags = Diagnostics::new();
        let parms = ParmMap::new().with("unpack_traversal", "std:nothing");
        let err = UnpackUsd::new(&ctx).cook(&input, &parms, 0.0, &diags).unwrap_err();
        assert_eq!(err.to_string(), "Failed locating traversal 'std:nothing'");
        assert!(diags.has_errors());
    }
}
