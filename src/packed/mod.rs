//! Packed USD primitives.
//!
//! This module provides:
//! - [`PackedUsd`] - Lazily bound prim handle with derived caches
//! - [`PackedUsdBuilder`] - Stamps new packed primitives into a detail
//! - [`InstanceKey`] - Structural identity used to share converted geometry
//! - [`GeometryCache`] - Converted geometry shared by instance key
//!
//! Owner-level setters (`Detail::set_packed_*`) live in this module too.

mod handle;
mod builder;
mod owner;
mod instance_key;
mod geometry_cache;

pub use handle::{
    CacheState, PackedUsd, ViewportLod, ALT_FILE_NAME_KEYS, FILE_NAME_KEYS, FRAME_KEYS,
    INDEX_KEYS, PACKED_USD_TYPE_NAME, PRIM_PATH_KEYS, PURPOSE_KEY, SRC_PRIM_PATH_KEYS,
};
pub use builder::PackedUsdBuilder;
pub use instance_key::InstanceKey;
pub use geometry_cache::GeometryCache;
