//! Unpacking packed USD primitives into geometry.
//!
//! This module provides:
//! - [`GeomTerm`] / [`Refiner`] - Lazy prim geometry and its refinement into details
//! - Unpack methods on [`PackedUsd`](crate::packed::PackedUsd) (`unpack_prim`, `unpack_geometry`, ...)
//! - [`traverse_for_unpack`] - Root expansion with the second pass down to geometry
//! - [`UnpackUsd`] - The unpack operator: traversal, expansion, delete and naming

mod refine;
mod pipeline;
mod traversal;
mod sop;

pub use refine::{
    DefaultRefiner, GeomTerm, MeshTerm, PointsTerm, RefineParms, Refiner, CONSTANT_ATTRIBS_NAME,
};
pub use traversal::{traverse_for_unpack, TraverseRequest};
pub use sop::{select_elements, GeomType, UnpackClass, UnpackParms, UnpackUsd};

/// Primitive (and reference point) attribute holding the stage file.
pub const PATH_ATTRIB: &str = "usdpath";

/// Primitive (and reference point) attribute holding the source prim path.
pub const PRIM_PATH_ATTRIB: &str = "usdprimpath";

/// Point attribute holding the transform applied while unpacking.
pub const XFORM_ATTRIB: &str = "usdxform";

/// Primitive attribute holding the authored visibility token.
pub const VISIBILITY_ATTRIB: &str = "usdvisibility";
