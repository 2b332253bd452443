//! Host geometry containers.
//!
//! This module provides:
//! - [`Detail`] - Points, vertices, primitives, attributes and groups
//! - [`Primitive`] / [`PackedPrim`] - Polygon, soup, point cloud and packed primitives
//! - [`AttributeSet`] / [`Attribute`] - Named attribute columns, including string tables

pub mod attribute;
pub mod primitive;
pub mod detail;

pub use attribute::{
    AttribData, AttribOwner, Attribute, AttributeSet, StringColumn, TypeInfo, INVALID_STRING_INDEX,
};
pub use primitive::{PackedPrim, Primitive};
pub use detail::Detail;
