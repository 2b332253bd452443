//! Scene traversal.
//!
//! A traversal expands root prims into the prims that should become
//! geometry, pairing each result with the index of the root it came from.
//! Traversals are looked up by name in a [`TraverseTable`] built once at
//! startup.
//!
//! This module provides:
//! - [`Traversal`] / [`TraversalOptions`] - The strategy interface
//! - [`TraverseTable`] - Name to traversal registry
//! - [`StdTraversal`] - Stop-at-first-match traversals (`std:boundable`, ...)
//! - [`CustomTraversal`] - Pattern/kind/purpose driven traversal (`std:custom`)

mod table;
mod standard;
mod custom;

pub use table::{TraverseTable, GPRIM_TRAVERSE_NAME, NO_TRAVERSE_NAME};
pub use standard::{StdTraversal, StopRule};
pub use custom::{CustomOptions, CustomTraversal, KindFilter, CUSTOM_TRAVERSE_NAME};

use crate::core::{DefaultArray, PurposeSet, TimeCode};
use crate::parms::ParmEvaluator;
use crate::stage::Prim;
use crate::util::Result;
use std::any::Any;

/// Selected prims paired with the index of the root they were found under.
pub type TraversalResult = Vec<(Prim, usize)>;

/// Per-traversal configuration, filled from parameters before use.
pub trait TraversalOptions: Send + Sync {
    fn configure(&mut self, parms: &dyn ParmEvaluator, time: f64) -> Result<()>;

    fn as_any(&self) -> &dyn Any;
}

/// Recover concrete options from a trait object.
///
/// # Panics
/// If `opts` is not a `T`. Options always come from the traversal's own
/// `create_options`, so a mismatch is a programming error.
pub fn downcast_options<T: Any>(opts: &dyn TraversalOptions) -> &T {
    match opts.as_any().downcast_ref::<T>() {
        Some(o) => o,
        None => panic!("traversal options are not {}", std::any::type_name::<T>()),
    }
}

/// A named traversal strategy.
pub trait Traversal: Send + Sync {
    fn name(&self) -> &str;

    /// Human readable label for menus.
    fn label(&self) -> &str;

    fn create_options(&self) -> Option<Box<dyn TraversalOptions>> {
        None
    }

    /// Expand `roots` into selected prims.
    ///
    /// `times` and `purposes` are indexed by root. Invalid roots are
    /// skipped. With `skip_root`, a root is never selected itself.
    /// Results are in depth-first pre-order per root, roots in order.
    fn find_prims(
        &self,
        roots: &[Option<Prim>],
        times: &DefaultArray<TimeCode>,
        purposes: &DefaultArray<PurposeSet>,
        skip_root: bool,
        opts: Option<&dyn TraversalOptions>,
    ) -> Result<TraversalResult>;
}
