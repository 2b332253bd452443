//! Stage layer - opened scene descriptions and the caches around them.
//!
//! This module provides:
//! - [`StageDescription`] - The serialized (JSON) scene description
//! - [`Stage`] / [`StageRef`] / [`StageOpts`] - Composed, immutable stages
//! - [`Prim`] - Handles to composed prims
//! - [`XformCache`] / [`BoundsCache`] - Per-stage memoized transforms and bounds
//! - [`StageOpener`] - Stage-open services (file and in-memory)
//! - [`StageCache`] - Shared, reader/writer locked cache of opened stages

mod description;
#[allow(clippy::module_inception)]
mod stage;
mod prim;
pub mod visibility;
mod xform_cache;
mod opener;
mod cache;

pub use description::{
    Interpolation, PrimDescription, PrimvarDescription, PrimvarValues, Role, StageDescription,
    VariantSetDescription, XformOps,
};
pub use stage::{Stage, StageOpts, StageRef};
pub use prim::{ModelKind, Prim, PrimId, PrimType, Primvar};
pub use visibility::Visibility;
pub use xform_cache::{BoundsCache, XformCache};
pub use opener::{FileStageOpener, MemoryStageOpener, StageOpener};
pub use cache::{StageCache, StageKey};
