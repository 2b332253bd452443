//! Utility types and functions for gusd.
//!
//! This module contains fundamental types used throughout the library:
//! - [`Error`] / [`Result`] - Error handling
//! - [`Diagnostics`] - Severity-tagged, non-fatal reporting
//! - [`Pattern`] - Name filters for primvars and attributes
//! - Math type re-exports from glam and [`BBox3d`]

mod error;
mod diagnostics;
mod math;
mod pattern;

pub use error::*;
pub use diagnostics::*;
pub use math::*;
pub use pattern::*;
