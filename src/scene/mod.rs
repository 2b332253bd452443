//! Viewport-facing scene registry.
//!
//! This module provides:
//! - [`SceneRegistry`] - Path to id table, typed buckets with change serials,
//!   selection and highlight state
//! - [`ScenePrim`] / [`EntityKind`] - Registered entities
//!
//! Ids are allocated on first reference to a path and stay reserved for the
//! life of the registry, even after the entity leaves its bucket.

mod registry;
mod selection;

pub use registry::{EntityKind, ScenePrim, SceneRegistry};
