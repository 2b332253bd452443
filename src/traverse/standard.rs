//! Standard stop-at-first-match traversals.

use super::{Traversal, TraversalOptions, TraversalResult};
use crate::core::{DefaultArray, Purpose, PurposeSet, TimeCode};
use crate::stage::{ModelKind, Prim};
use crate::util::Result;

/// Which prims end a descent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopRule {
    /// Geometry-bearing prims.
    Boundable,
    Component,
    /// Groups and assemblies.
    Group,
    Assembly,
    Subcomponent,
}

impl StopRule {
    pub fn matches(self, prim: &Prim) -> bool {
        match self {
            Self::Boundable => prim.is_boundable(),
            Self::Component => prim.kind() == Some(ModelKind::Component),
            Self::Group => prim.kind().is_some_and(ModelKind::is_group),
            Self::Assembly => prim.kind() == Some(ModelKind::Assembly),
            Self::Subcomponent => prim.kind() == Some(ModelKind::Subcomponent),
        }
    }
}

/// Descends each root until the first prim matching its [`StopRule`].
///
/// Inactive prims, authored-invisible prims and prims whose purpose is not
/// in the root's purpose set are pruned with their subtrees.
#[derive(Clone, Debug)]
pub struct StdTraversal {
    name: &'static str,
    label: &'static str,
    rule: StopRule,
}

impl StdTraversal {
    pub const fn new(name: &'static str, label: &'static str, rule: StopRule) -> Self {
        Self { name, label, rule }
    }

    pub fn boundable() -> Self {
        Self::new(super::GPRIM_TRAVERSE_NAME, "Gprims", StopRule::Boundable)
    }

    pub fn components() -> Self {
        Self::new("std:components", "Components", StopRule::Component)
    }

    pub fn groups() -> Self {
        Self::new("std:groups", "Groups", StopRule::Group)
    }

    pub fn assemblies() -> Self {
        Self::new("std:assemblies", "Assemblies", StopRule::Assembly)
    }

    pub fn subcomponents() -> Self {
        Self::new("std:subcomponents", "Subcomponents", StopRule::Subcomponent)
    }

    pub fn rule(&self) -> StopRule {
        self.rule
    }
}

impl Traversal for StdTraversal {
    fn name(&self) -> &str {
        self.name
    }

    fn label(&self) -> &str {
        self.label
    }

    #[tracing::instrument(level = "debug", skip_all, fields(traversal = self.name, roots = roots.len()))]
    fn find_prims(
        &self,
        roots: &[Option<Prim>],
        times: &DefaultArray<TimeCode>,
        purposes: &DefaultArray<PurposeSet>,
        skip_root: bool,
        _opts: Option<&dyn TraversalOptions>,
    ) -> Result<TraversalResult> {
        let mut out = TraversalResult::new();
        for (origin, root) in roots.iter().enumerate() {
            let Some(root) = root else { continue };
            let visit = Visit { time: *times.get(origin), purposes: *purposes.get(origin), origin };
            if !root_passes(root, &visit) {
                continue;
            }
            if !skip_root && self.rule.matches(root) {
                out.push((root.clone(), origin));
                continue;
            }
            for child in root.children() {
                self.visit(&child, &visit, &mut out);
            }
        }
        tracing::debug!(found = out.len(), "traversal done");
        Ok(out)
    }
}

impl StdTraversal {
    fn visit(&self, prim: &Prim, v: &Visit, out: &mut TraversalResult) {
        if !prim_passes(prim, v) {
            return;
        }
        if self.rule.matches(prim) {
            out.push((prim.clone(), v.origin));
            return;
        }
        for child in prim.children() {
            self.visit(&child, v, out);
        }
    }
}

/// Per-root traversal state.
pub(crate) struct Visit {
    pub time: TimeCode,
    pub purposes: PurposeSet,
    pub origin: usize,
}

/// Roots are tested with inherited state: active, visible through their
/// ancestors, and computed purpose in the set.
pub(crate) fn root_passes(root: &Prim, v: &Visit) -> bool {
    root.is_active()
        && root.is_visible(v.time)
        && v.purposes.includes(root.computed_purpose())
}

/// Descendants only need their own authored state; ancestors were checked
/// on the way down.
pub(crate) fn prim_passes(prim: &Prim, v: &Visit) -> bool {
    if !prim.is_active() {
        return false;
    }
    if prim.authored_visibility(v.time).is_some_and(|vis| vis.is_invisible()) {
        return false;
    }
    match prim.purpose() {
        Purpose::Default => true,
        p => v.purposes.includes(p),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{Stage, StageDescription, StageOpts};
    use crate::core::{PrimPath, StageEdit};
    use serde_json::json;
    use std::sync::Arc;

    fn stage() -> crate::stage::StageRef {
        let desc: StageDescription = serde_json::from_value(json!({
            "prims": [
                { "name": "world", "type": "Xform", "kind": "assembly", "children": [
                    { "name": "tree", "type": "Xform", "kind": "component", "children": [
                        { "name": "trunk", "type": "Mesh" },
                        { "name": "leaves", "type": "Mesh", "purpose": "render" },
                        { "name": "proxy", "type": "Mesh", "purpose": "proxy" }
                    ] },
                    { "name": "hidden", "type": "Xform", "kind": "component",
                      "visibility": { "default": "invisible" },
                      "children": [ { "name": "m", "type": "Mesh" } ] },
                    { "name": "off", "type": "Mesh", "active": false },
                    { "name": "rock", "type": "Mesh" },
                    { "name": "inst", "type": "Xform", "instance": "proto" }
                ] }
            ],
            "masters": { "proto": [ { "name": "shape", "type": "Points" } ] }
        }))
        .unwrap();
        Arc::new(Stage::compose("t.usd", &desc, &StageOpts::load_all(), &StageEdit::default()).unwrap())
    }

    fn root(stage: &crate::stage::StageRef, path: &str) -> Option<Prim> {
        Prim::at_path(stage, &PrimPath::new(path).unwrap())
    }

    fn paths(result: &TraversalResult) -> Vec<(String, usize)> {
        result.iter().map(|(p, i)| (p.path().to_string(), *i)).collect()
    }

    #[test]
    fn test_boundable_traversal() {
        let stage = stage();
        let roots = vec![root(&stage, "/world")];
        let result = StdTraversal::boundable()
            .find_prims(&roots, &DefaultArray::new(TimeCode::Default), &DefaultArray::new(PurposeSet::default()), true, None)
            .unwrap();
        assert_eq!(
            paths(&result),
            vec![
                ("/world/tree/trunk".to_string(), 0),
                ("/world/tree/proxy".to_string(), 0),
                ("/world/rock".to_string(), 0),
                ("/world/inst/shape".to_string(), 0),
            ]
        );
        assert!(result[3].0.is_instance_proxy());
    }

    #[test]
    fn test_skip_root_and_invalid_roots() {
        let stage = stage();
        let roots = vec![None, root(&stage, "/world/rock")];
        let times = DefaultArray::new(TimeCode::Default);
        let purposes = DefaultArray::new(PurposeSet::default());
        let t = StdTraversal::boundable();
        assert!(t.find_prims(&roots, &times, &purposes, true, None).unwrap().is_empty());
        let result = t.find_prims(&roots, &times, &purposes, false, None).unwrap();
        assert_eq!(paths(&result), vec![("/world/rock".to_string(), 1)]);
    }

    #[test]
    fn test_per_root_purposes() {
        let stage = stage();
        let tree = root(&stage, "/world/tree");
        let roots = vec![tree.clone(), tree];
        let purposes = DefaultArray::varying(
            PurposeSet::DEFAULT,
            vec![PurposeSet::DEFAULT, PurposeSet::DEFAULT | PurposeSet::RENDER],
        );
        let result = StdTraversal::boundable()
            .find_prims(&roots, &DefaultArray::new(TimeCode::Default), &purposes, true, None)
            .unwrap();
        assert_eq!(
            paths(&result),
            vec![
                ("/world/tree/trunk".to_string(), 0),
                ("/world/tree/trunk".to_string(), 1),
                ("/world/tree/leaves".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_kind_traversals() {
        let stage = stage();
        let roots = vec![root(&stage, "/world")];
        let times = DefaultArray::new(TimeCode::Default);
        let purposes = DefaultArray::new(PurposeSet::default());
        let comps = StdTraversal::components().find_prims(&roots, &times, &purposes, true, None).unwrap();
        assert_eq!(paths(&comps), vec![("/world/tree".to_string(), 0)]);

        let groups = StdTraversal::groups().find_prims(&roots, &times, &purposes, false, None).unwrap();
        assert_eq!(paths(&groups), vec![("/world".to_string(), 0)]);
        let groups = StdTraversal::groups().find_prims(&roots, &times, &purposes, true, None).unwrap();
        assert!(groups.is_empty());
    }
}
