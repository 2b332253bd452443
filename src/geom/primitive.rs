//! Primitive kinds stored in a [`Detail`](super::Detail).

use crate::packed::PackedUsd;
use crate::util::{DMat4, DVec3};
use std::ops::Range;

/// Packed primitive: a handle placed by a transform.
///
/// The transform's translation mirrors the position of the primitive's
/// point; [`Detail::set_packed_transform`](super::Detail::set_packed_transform)
/// keeps both in sync.
#[derive(Clone, Debug)]
pub struct PackedPrim {
    pub(crate) handle: PackedUsd,
    pub(crate) point: usize,
    pub(crate) transform: DMat4,
}

impl PackedPrim {
    pub fn handle(&self) -> &PackedUsd {
        &self.handle
    }

    pub fn handle_mut(&mut self) -> &mut PackedUsd {
        &mut self.handle
    }

    pub fn point(&self) -> usize {
        self.point
    }

    pub fn transform(&self) -> DMat4 {
        self.transform
    }

    pub fn position(&self) -> DVec3 {
        self.transform.w_axis.truncate()
    }
}

/// A geometric primitive.
#[derive(Clone, Debug)]
pub enum Primitive {
    /// Closed polygon over a range of the vertex list.
    Polygon { vertices: Range<usize> },
    /// Many polygons sharing one primitive record.
    PolySoup { polygons: Vec<Range<usize>> },
    /// Unconnected points.
    PointCloud { points: Vec<usize> },
    Packed(Box<PackedPrim>),
}

impl Primitive {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Polygon { .. } => "Poly",
            Self::PolySoup { .. } => "PolySoup",
            Self::PointCloud { .. } => "PointCloud",
            Self::Packed(_) => "PackedUSD",
        }
    }

    pub fn is_packed(&self) -> bool {
        matches!(self, Self::Packed(_))
    }

    pub fn as_packed(&self) -> Option<&PackedPrim> {
        match self {
            Self::Packed(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_packed_mut(&mut self) -> Option<&mut PackedPrim> {
        match self {
            Self::Packed(p) => Some(p),
            _ => None,
        }
    }

    /// Vertex ranges owned by this primitive.
    pub(crate) fn vertex_ranges(&self) -> Vec<Range<usize>> {
        match self {
            Self::Polygon { vertices } => vec![vertices.clone()],
            Self::PolySoup { polygons } => polygons.clone(),
            Self::PointCloud { .. } | Self::Packed(_) => Vec::new(),
        }
    }

    /// Number of polygons (faces) this primitive contributes.
    pub fn face_count(&self) -> usize {
        match self {
            Self::Polygon { .. } => 1,
            Self::PolySoup { polygons } => polygons.len(),
            Self::PointCloud { .. } | Self::Packed(_) => 0,
        }
    }
}
