//! # gusd
//!
//! Packed USD primitives for a procedural geometry host.
//!
//! A packed USD primitive is a lightweight reference to one prim on a
//! composed stage: a file, a prim path and a frame, plus a viewport LOD and
//! a purpose set. Packed prims are created by traversing stages, carried
//! through geometry details, and finally unpacked back into child packed
//! prims or into real polygons and points.
//!
//! ## Modules
//!
//! - [`util`] - Errors, diagnostics, name patterns, math
//! - [`core`] - Time codes, purposes, prim paths, default arrays
//! - [`stage`] - Stage descriptions, composed stages, the stage cache
//! - [`geom`] - Geometry detail with attributes and groups
//! - [`packed`] - Packed USD handles, builder, geometry cache
//! - [`traverse`] - Traversal plugins and their registry
//! - [`unpack`] - Refinement and the unpack operator
//! - [`scene`] - Viewport scene registry and selection
//!
//! ## Example
//!
//! ```ignore
//! use gusd::prelude::*;
//!
//! let ctx = Context::default();
//! let diags = Diagnostics::new();
//! let mut input = Detail::new();
//! PackedUsdBuilder::new("shot.usd", PrimPath::new("/world")?).build(&mut input, ctx.stage_cache(), &diags);
//!
//! let parms = ParmMap::new().with("traversal", "std:components");
//! let out = UnpackUsd::new(&ctx).cook(&input, &parms, 1.0, &diags)?;
//! ```

pub mod util;
pub mod core;
pub mod stage;
pub mod geom;
pub mod packed;
pub mod parms;
pub mod traverse;
pub mod unpack;
pub mod scene;
pub mod context;
pub mod config;

// Re-export commonly used types
pub use util::{Diagnostics, Error, Result, Severity};
pub use context::Context;
pub use config::Config;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::util::{Diagnostics, Error, Result, Severity};
    pub use crate::core::{DefaultArray, PrimPath, PurposeSet, TimeCode};
    pub use crate::stage::{Prim, Stage, StageCache, StageDescription, StageOpts};
    pub use crate::geom::{AttribOwner, Detail};
    pub use crate::packed::{PackedUsd, PackedUsdBuilder};
    pub use crate::parms::{ParmEvaluator, ParmMap};
    pub use crate::traverse::{Traversal, TraverseTable};
    pub use crate::unpack::{UnpackParms, UnpackUsd};
    pub use crate::scene::SceneRegistry;
    pub use crate::context::Context;
    pub use crate::config::Config;
}
