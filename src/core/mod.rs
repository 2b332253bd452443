//! Core layer - fundamental value types shared by every component.
//!
//! This module provides:
//! - [`TimeCode`] / [`Sampled`] - Evaluation times and time-sampled values
//! - [`PurposeSet`] / [`Purpose`] - Visibility categories
//! - [`PrimPath`] / [`StageEdit`] - Scene paths with variant selections
//! - [`DefaultArray`] / [`remap_array`] - Broadcast-or-per-element arrays
//! - [`Options`] - Flat key/value records for save/load and instance keys

mod time;
mod purpose;
mod path;
mod default_array;
mod options;

pub use time::{TimeCode, Sampled};
pub use purpose::{PurposeSet, Purpose};
pub use path::{PrimPath, StageEdit, VariantSelection};
pub use default_array::{DefaultArray, remap_array};
pub use options::{Options, OptionValue};
