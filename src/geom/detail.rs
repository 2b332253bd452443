//! The destination geometry container.
//!
//! A [`Detail`] holds points, a vertex list, primitives, attribute sets
//! for each element class, primitive groups and a topology serial that is
//! bumped whenever the element structure changes.

use super::attribute::{AttribOwner, Attribute, AttributeSet, TypeInfo};
use super::primitive::{PackedPrim, Primitive};
use crate::packed::PackedUsd;
use crate::util::{DMat3, DMat4, DVec3};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

/// Geometry container: points, vertices, primitives and their attributes.
#[derive(Clone, Debug)]
pub struct Detail {
    points: Vec<DVec3>,
    /// Point index per vertex.
    vertices: Vec<usize>,
    primitives: Vec<Primitive>,
    point_attribs: AttributeSet,
    vertex_attribs: AttributeSet,
    prim_attribs: AttributeSet,
    detail_attribs: AttributeSet,
    prim_groups: BTreeMap<String, BTreeSet<usize>>,
    topology_serial: u64,
}

impl Default for Detail {
    fn default() -> Self {
        Self::new()
    }
}

impl Detail {
    pub fn new() -> Self {
        Self {
            points: Vec::new(),
            vertices: Vec::new(),
            primitives: Vec::new(),
            point_attribs: AttributeSet::new(AttribOwner::Point),
            vertex_attribs: AttributeSet::new(AttribOwner::Vertex),
            prim_attribs: AttributeSet::new(AttribOwner::Primitive),
            detail_attribs: AttributeSet::new(AttribOwner::Detail),
            prim_groups: BTreeMap::new(),
            topology_serial: 0,
        }
    }

    // ========================================================================
    // Element access
    // ========================================================================

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_primitives(&self) -> usize {
        self.primitives.len()
    }

    pub fn points(&self) -> &[DVec3] {
        &self.points
    }

    pub fn point(&self, offset: usize) -> DVec3 {
        self.points[offset]
    }

    pub fn set_point(&mut self, offset: usize, p: DVec3) {
        self.points[offset] = p;
    }

    /// Point index referenced by each vertex.
    pub fn vertices(&self) -> &[usize] {
        &self.vertices
    }

    pub fn primitives(&self) -> &[Primitive] {
        &self.primitives
    }

    pub fn primitive(&self, offset: usize) -> Option<&Primitive> {
        self.primitives.get(offset)
    }

    /// Point indices of a polygon's (or each soup polygon's) vertices.
    pub fn polygon_points(&self, range: &Range<usize>) -> &[usize] {
        &self.vertices[range.clone()]
    }

    /// Count of polygons over all polygon and soup primitives.
    pub fn num_faces(&self) -> usize {
        self.primitives.iter().map(Primitive::face_count).sum()
    }

    /// Serial bumped on every structural change.
    pub fn topology_serial(&self) -> u64 {
        self.topology_serial
    }

    pub fn bump_topology(&mut self) {
        self.topology_serial += 1;
    }

    // ========================================================================
    // Attributes and groups
    // ========================================================================

    pub fn attribs(&self, owner: AttribOwner) -> &AttributeSet {
        match owner {
            AttribOwner::Point => &self.point_attribs,
            AttribOwner::Vertex => &self.vertex_attribs,
            AttribOwner::Primitive => &self.prim_attribs,
            AttribOwner::Detail => &self.detail_attribs,
        }
    }

    pub fn attribs_mut(&mut self, owner: AttribOwner) -> &mut AttributeSet {
        match owner {
            AttribOwner::Point => &mut self.point_attribs,
            AttribOwner::Vertex => &mut self.vertex_attribs,
            AttribOwner::Primitive => &mut self.prim_attribs,
            AttribOwner::Detail => &mut self.detail_attribs,
        }
    }

    /// Element count of an owner class; the detail class has one element.
    pub fn element_count(&self, owner: AttribOwner) -> usize {
        match owner {
            AttribOwner::Point => self.points.len(),
            AttribOwner::Vertex => self.vertices.len(),
            AttribOwner::Primitive => self.primitives.len(),
            AttribOwner::Detail => 1,
        }
    }

    pub fn find_attrib(&self, owner: AttribOwner, name: &str) -> Option<&Attribute> {
        self.attribs(owner).find(name)
    }

    pub fn prim_group(&self, name: &str) -> Option<&BTreeSet<usize>> {
        self.prim_groups.get(name)
    }

    pub fn prim_group_names(&self) -> impl Iterator<Item = &str> {
        self.prim_groups.keys().map(String::as_str)
    }

    pub fn add_to_prim_group(&mut self, name: &str, offsets: impl IntoIterator<Item = usize>) {
        self.prim_groups.entry(name.to_string()).or_default().extend(offsets);
    }

    /// Names of the groups containing primitive `offset`.
    pub fn groups_containing(&self, offset: usize) -> Vec<String> {
        self.prim_groups
            .iter()
            .filter(|(_, members)| members.contains(&offset))
            .map(|(name, _)| name.clone())
            .collect()
    }

    // ========================================================================
    // Construction
    // ========================================================================

    pub fn append_point(&mut self, p: DVec3) -> usize {
        self.append_points(&[p]).start
    }

    pub fn append_points(&mut self, points: &[DVec3]) -> Range<usize> {
        let start = self.points.len();
        self.points.extend_from_slice(points);
        self.point_attribs.resize(self.points.len());
        self.bump_topology();
        start..self.points.len()
    }

    fn append_vertices(&mut self, points: &[usize]) -> Range<usize> {
        let start = self.vertices.len();
        self.vertices.extend_from_slice(points);
        self.vertex_attribs.resize(self.vertices.len());
        start..self.vertices.len()
    }

    fn push_primitive(&mut self, prim: Primitive) -> usize {
        self.primitives.push(prim);
        self.prim_attribs.resize(self.primitives.len());
        self.bump_topology();
        self.primitives.len() - 1
    }

    /// Append a polygon over existing points.
    pub fn append_polygon(&mut self, points: &[usize]) -> usize {
        let vertices = self.append_vertices(points);
        self.push_primitive(Primitive::Polygon { vertices })
    }

    /// Append one soup primitive holding several polygons.
    pub fn append_poly_soup(&mut self, polygons: &[Vec<usize>]) -> usize {
        let polygons = polygons.iter().map(|p| self.append_vertices(p)).collect();
        self.push_primitive(Primitive::PolySoup { polygons })
    }

    pub fn append_point_cloud(&mut self, points: Vec<usize>) -> usize {
        self.push_primitive(Primitive::PointCloud { points })
    }

    /// Append a packed primitive with its own point.
    pub fn append_packed(&mut self, handle: PackedUsd, transform: DMat4) -> usize {
        let point = self.append_point(transform.w_axis.truncate());
        self.push_primitive(Primitive::Packed(Box::new(PackedPrim { handle, point, transform })))
    }

    // ========================================================================
    // Packed primitives
    // ========================================================================

    pub fn packed(&self, offset: usize) -> Option<&PackedPrim> {
        self.primitives.get(offset)?.as_packed()
    }

    pub fn packed_mut(&mut self, offset: usize) -> Option<&mut PackedPrim> {
        self.primitives.get_mut(offset)?.as_packed_mut()
    }

    /// Offsets of all packed primitives.
    pub fn packed_offsets(&self) -> Vec<usize> {
        (0..self.primitives.len()).filter(|&i| self.primitives[i].is_packed()).collect()
    }

    /// Full transform of a packed primitive.
    ///
    /// # Panics
    /// If `offset` is not a packed primitive.
    pub fn packed_transform(&self, offset: usize) -> DMat4 {
        match self.packed(offset) {
            Some(p) => p.transform,
            None => panic!("primitive {offset} is not packed"),
        }
    }

    /// Set a packed primitive's transform and move its point.
    ///
    /// # Panics
    /// If `offset` is not a packed primitive.
    pub fn set_packed_transform(&mut self, offset: usize, transform: DMat4) {
        let Some(packed) = self.packed_mut(offset) else {
            panic!("primitive {offset} is not packed");
        };
        packed.transform = transform;
        let point = packed.point;
        self.points[point] = transform.w_axis.truncate();
    }

    // ========================================================================
    // Transforms and merging
    // ========================================================================

    /// Transform positions, packed transforms and every transforming
    /// point/vector/normal attribute.
    pub fn transform(&mut self, xform: &DMat4) {
        for p in &mut self.points {
            *p = xform.transform_point3(*p);
        }
        for prim in &mut self.primitives {
            if let Primitive::Packed(packed) = prim {
                packed.transform = *xform * packed.transform;
            }
        }
        for owner in [AttribOwner::Point, AttribOwner::Vertex, AttribOwner::Primitive, AttribOwner::Detail] {
            for attrib in self.attribs_mut(owner).iter_mut() {
                transform_attrib(attrib, xform);
            }
        }
    }

    /// Append `other`, optionally transformed. Returns the new primitive offsets.
    ///
    /// Attributes missing on either side are created with default values;
    /// attributes whose types disagree keep this detail's definition and
    /// receive defaults for the merged elements.
    pub fn merge(&mut self, other: &Detail, xform: Option<&DMat4>) -> Range<usize> {
        let mut other = other.clone();
        if let Some(xform) = xform {
            other.transform(xform);
        }
        let point_base = self.points.len();
        let vertex_base = self.vertices.len();
        let prim_base = self.primitives.len();

        for owner in [AttribOwner::Point, AttribOwner::Vertex, AttribOwner::Primitive] {
            let base = self.element_count(owner);
            let count = other.element_count(owner);
            merge_attribs(self.attribs_mut(owner), other.attribs(owner), base, count);
        }
        for attrib in other.detail_attribs.iter() {
            if !self.detail_attribs.contains(attrib.name()) {
                if let Ok(dst) = self.detail_attribs.add(attrib.name(), attrib.data(), 1) {
                    dst.set_type_info(attrib.type_info());
                    dst.set_non_transforming(attrib.is_non_transforming());
                    dst.copy_element(0, attrib, 0);
                }
            }
        }

        self.points.extend_from_slice(&other.points);
        self.vertices.extend(other.vertices.iter().map(|p| p + point_base));
        let shift = |r: &Range<usize>| r.start + vertex_base..r.end + vertex_base;
        for prim in other.primitives {
            self.primitives.push(match prim {
                Primitive::Polygon { vertices } => Primitive::Polygon { vertices: shift(&vertices) },
                Primitive::PolySoup { polygons } => {
                    Primitive::PolySoup { polygons: polygons.iter().map(shift).collect() }
                }
                Primitive::PointCloud { points } => {
                    Primitive::PointCloud { points: points.iter().map(|p| p + point_base).collect() }
                }
                Primitive::Packed(mut packed) => {
                    packed.point += point_base;
                    Primitive::Packed(packed)
                }
            });
        }
        for (name, members) in other.prim_groups {
            self.add_to_prim_group(&name, members.into_iter().map(|m| m + prim_base));
        }
        self.bump_topology();
        prim_base..self.primitives.len()
    }

    // ========================================================================
    // Deletion
    // ========================================================================

    /// Delete primitives. With `and_points`, points referenced only by the
    /// deleted primitives are deleted too.
    pub fn destroy_primitives(&mut self, offsets: &[usize], and_points: bool) {
        let mut keep_prim = vec![true; self.primitives.len()];
        for &o in offsets {
            if let Some(k) = keep_prim.get_mut(o) {
                *k = false;
            }
        }
        if keep_prim.iter().all(|&k| k) {
            return;
        }

        let mut used_by_kept = vec![false; self.points.len()];
        let mut used_by_dead = vec![false; self.points.len()];
        for (prim, &keep) in self.primitives.iter().zip(&keep_prim) {
            let used = if keep { &mut used_by_kept } else { &mut used_by_dead };
            for p in self.referenced_points(prim) {
                used[p] = true;
            }
        }

        // Rebuild primitives and the vertex list.
        let mut keep_vertex = vec![false; self.vertices.len()];
        let mut new_vertices = Vec::with_capacity(self.vertices.len());
        let mut new_prims = Vec::with_capacity(self.primitives.len());
        let mut remap = vec![usize::MAX; self.primitives.len()];
        let old_vertices = std::mem::take(&mut self.vertices);
        let mut relocate = |r: &Range<usize>, keep_vertex: &mut Vec<bool>| {
            let start = new_vertices.len();
            for v in r.clone() {
                keep_vertex[v] = true;
                new_vertices.push(old_vertices[v]);
            }
            start..new_vertices.len()
        };
        for (i, prim) in std::mem::take(&mut self.primitives).into_iter().enumerate() {
            if !keep_prim[i] {
                continue;
            }
            remap[i] = new_prims.len();
            new_prims.push(match prim {
                Primitive::Polygon { vertices } => {
                    Primitive::Polygon { vertices: relocate(&vertices, &mut keep_vertex) }
                }
                Primitive::PolySoup { polygons } => Primitive::PolySoup {
                    polygons: polygons.iter().map(|r| relocate(r, &mut keep_vertex)).collect(),
                },
                other => other,
            });
        }
        self.vertices = new_vertices;
        self.primitives = new_prims;
        self.vertex_attribs.compact(&keep_vertex);
        self.prim_attribs.compact(&keep_prim);
        for members in self.prim_groups.values_mut() {
            *members = members
                .iter()
                .filter_map(|&m| remap.get(m).copied().filter(|&n| n != usize::MAX))
                .collect();
        }

        if and_points {
            let keep_point: Vec<bool> = used_by_dead
                .iter()
                .zip(&used_by_kept)
                .map(|(&dead, &kept)| !dead || kept)
                .collect();
            self.compact_points(&keep_point);
        }
        self.bump_topology();
    }

    /// Delete points no primitive references. Returns how many were deleted.
    pub fn destroy_points(&mut self, offsets: &[usize]) -> usize {
        let mut used = vec![false; self.points.len()];
        for prim in &self.primitives {
            for p in self.referenced_points(prim) {
                used[p] = true;
            }
        }
        let mut keep = vec![true; self.points.len()];
        let mut removed = 0;
        for &o in offsets {
            if o < keep.len() && keep[o] && !used[o] {
                keep[o] = false;
                removed += 1;
            }
        }
        if removed > 0 {
            self.compact_points(&keep);
            self.bump_topology();
        }
        removed
    }

    fn referenced_points(&self, prim: &Primitive) -> Vec<usize> {
        match prim {
            Primitive::Polygon { .. } | Primitive::PolySoup { .. } => prim
                .vertex_ranges()
                .into_iter()
                .flat_map(|r| self.vertices[r].to_vec())
                .collect(),
            Primitive::PointCloud { points } => points.clone(),
            Primitive::Packed(p) => vec![p.point],
        }
    }

    fn compact_points(&mut self, keep: &[bool]) {
        let mut remap = vec![usize::MAX; self.points.len()];
        let mut next = 0;
        for (i, &k) in keep.iter().enumerate() {
            if k {
                remap[i] = next;
                next += 1;
            }
        }
        let old = std::mem::take(&mut self.points);
        self.points = old.into_iter().zip(keep).filter(|(_, &k)| k).map(|(p, _)| p).collect();
        self.point_attribs.compact(keep);
        for v in &mut self.vertices {
            *v = remap[*v];
        }
        for prim in &mut self.primitives {
            match prim {
                Primitive::PointCloud { points } => {
                    points.retain(|p| remap[*p] != usize::MAX);
                    for p in points.iter_mut() {
                        *p = remap[*p];
                    }
                }
                Primitive::Packed(packed) => packed.point = remap[packed.point],
                _ => {}
            }
        }
    }
}

fn merge_attribs(dst: &mut AttributeSet, src: &AttributeSet, base: usize, count: usize) {
    for attrib in src.iter() {
        if let Ok(created) = dst.add(attrib.name(), attrib.data(), base) {
            if created.type_info() == TypeInfo::None {
                created.set_type_info(attrib.type_info());
            }
            if attrib.is_non_transforming() {
                created.set_non_transforming(true);
            }
        }
    }
    dst.resize(base + count);
    for attrib in src.iter() {
        let Some(target) = dst.find_mut(attrib.name()) else {
            continue;
        };
        if !target.data().is_compatible(attrib.data()) {
            continue;
        }
        for i in 0..count {
            target.copy_element(base + i, attrib, i);
        }
    }
}

fn transform_attrib(attrib: &mut Attribute, xform: &DMat4) {
    if attrib.is_non_transforming() || attrib.tuple_size() != 3 {
        return;
    }
    let normal_matrix = DMat3::from_mat4(*xform).inverse().transpose();
    let info = attrib.type_info();
    let map = |v: DVec3| match info {
        TypeInfo::Point => Some(xform.transform_point3(v)),
        TypeInfo::Vector => Some(xform.transform_vector3(v)),
        TypeInfo::Normal => Some((normal_matrix * v).normalize_or_zero()),
        _ => None,
    };
    for i in 0..attrib.len() {
        let Some(v) = attrib.floats(i).map(DVec3::from_slice) else {
            return;
        };
        match map(v) {
            Some(t) => attrib.set_floats(i, &t.to_array()),
            None => return,
        }
    }
}
