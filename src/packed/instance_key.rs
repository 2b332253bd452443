//! Instance keys: structural identity of a packed primitive's geometry.
//!
//! Two packed primitives with equal keys convert to identical geometry, so
//! downstream conversion caches may share one result between them.
//! Instances and instance proxies replace the path by a master key so every
//! instance of one master shares an entry.

use crate::core::{Options, PurposeSet, TimeCode};
use crate::stage::Prim;
use std::hash::{Hash, Hasher};

/// `{file, path-or-master-key, time, purposes}`.
#[derive(Clone, Debug)]
pub struct InstanceKey {
    pub file: String,
    /// Prim path, or the master key for instances and instance proxies.
    pub path: String,
    pub time: TimeCode,
    pub purposes: PurposeSet,
}

impl InstanceKey {
    /// Master key: stage identity token followed by the master-side path.
    pub fn master_key(stage_id: u64, master_path: &str) -> String {
        format!("stage{stage_id:x}:{master_path}")
    }

    /// Master key of an instance or instance proxy; `None` for other prims.
    pub fn master_path_of(prim: &Prim) -> Option<String> {
        let stage_id = prim.stage().id();
        if let Some(master) = prim.master() {
            return Some(Self::master_key(stage_id, master.path().as_str()));
        }
        prim.prim_in_master()
            .map(|p| Self::master_key(stage_id, p.path().as_str()))
    }

    /// Key for the geometry of `prim` read from `file`.
    pub fn for_prim(file: &str, prim: &Prim, time: TimeCode, purposes: PurposeSet) -> Self {
        Self {
            file: file.to_string(),
            path: Self::master_path_of(prim).unwrap_or_else(|| prim.path().to_string()),
            time,
            purposes,
        }
    }

    /// Flat record with the short keys `f`, `n`, `t`, `p`.
    pub fn to_options(&self) -> Options {
        let mut o = Options::new();
        o.set_string("f", self.file.clone());
        o.set_string("n", self.path.clone());
        o.set_float("t", self.time.numeric());
        o.set_int("p", i64::from(self.purposes.bits()));
        o
    }
}

impl PartialEq for InstanceKey {
    fn eq(&self, other: &Self) -> bool {
        self.file == other.file
            && self.path == other.path
            && self.time.bits() == other.time.bits()
            && self.purposes == other.purposes
    }
}

impl Eq for InstanceKey {}

impl Hash for InstanceKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.file.hash(state);
        self.path.hash(state);
        self.time.bits().hash(state);
        self.purposes.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn key(path: &str, time: TimeCode) -> InstanceKey {
        InstanceKey { file: "a.usd".into(), path: path.into(), time, purposes: PurposeSet::default() }
    }

    #[test]
    fn test_equality_by_time_bits() {
        assert_eq!(key("/a", TimeCode::Default), key("/a", TimeCode::Default));
        assert_eq!(key("/a", TimeCode::Frame(0.0)), key("/a", TimeCode::Frame(-0.0)));
        assert_ne!(key("/a", TimeCode::Frame(1.0)), key("/a", TimeCode::Default));

        let set: HashSet<_> = [key("/a", TimeCode::Default), key("/a", TimeCode::Default)].into();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_options_shape() {
        let mut k = key("/a", TimeCode::Frame(3.0));
        k.path = InstanceKey::master_key(0x1f, "/__Master_1");
        let o = k.to_options();
        assert_eq!(o.get_string("n"), Some("stage1f:/__Master_1"));
        assert_eq!(o.get_float("t"), Some(3.0));
        assert_eq!(o.get_int("p"), Some(5));
    }
}
