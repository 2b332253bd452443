//! Traversal for unpacking, including the second pass down to geometry.

use crate::core::{remap_array, DefaultArray, PurposeSet, TimeCode};
use crate::parms::ParmEvaluator;
use crate::stage::Prim;
use crate::traverse::{TraversalResult, TraverseTable, GPRIM_TRAVERSE_NAME, NO_TRAVERSE_NAME};
use crate::util::{Diagnostics, Error, Result};

/// Roots of one traversal with their per-root times and purposes.
#[derive(Clone, Copy, Debug)]
pub struct TraverseRequest<'a> {
    pub roots: &'a [Option<Prim>],
    pub times: &'a DefaultArray<TimeCode>,
    pub purposes: &'a DefaultArray<PurposeSet>,
}

/// Select the prims to unpack.
///
/// The pass-through name `none` keeps the valid roots as they are. When
/// unpacking to polygons and the chosen traversal does not already stop at
/// geometry, a second boundable pass runs over the first pass's results,
/// with times and purposes remapped to them. Origin indices in the result
/// always refer to `request.roots`.
///
/// An unregistered traversal name is reported and returned as
/// [`Error::UnknownTraversal`]; nothing is returned for the other roots.
#[tracing::instrument(level = "debug", skip_all, fields(traversal = name, roots = request.roots.len()))]
pub fn traverse_for_unpack(
    table: &TraverseTable,
    name: &str,
    request: &TraverseRequest<'_>,
    to_polygons: bool,
    parms: &dyn ParmEvaluator,
    time: f64,
    diagnostics: &Diagnostics,
) -> Result<TraversalResult> {
    let first = if name == NO_TRAVERSE_NAME {
        pass_through(request.roots)
    } else {
        let skip_root = name != GPRIM_TRAVERSE_NAME;
        run(table, name, request, skip_root, parms, time, diagnostics)?
    };
    if !to_polygons || name == GPRIM_TRAVERSE_NAME {
        return Ok(first);
    }

    let _span = tracing::debug_span!("boundable_pass", prims = first.len()).entered();
    let prims: Vec<Option<Prim>> = first.iter().map(|(p, _)| Some(p.clone())).collect();
    let purposes = if request.purposes.is_varying() {
        DefaultArray::varying(
            *request.purposes.default_value(),
            remap_array(&first, request.purposes.array(), &PurposeSet::DEFAULT),
        )
    } else {
        DefaultArray::new(*request.purposes.default_value())
    };
    let times = request.times.remapped(&first);
    let second = TraverseRequest { roots: &prims, times: &times, purposes: &purposes };
    let found = run(table, GPRIM_TRAVERSE_NAME, &second, false, parms, time, diagnostics)?;

    Ok(found
        .into_iter()
        .map(|(prim, i)| {
            let origin = first[i].1;
            (prim, origin)
        })
        .collect())
}

fn pass_through(roots: &[Option<Prim>]) -> TraversalResult {
    roots
        .iter()
        .enumerate()
        .filter_map(|(i, r)| r.clone().map(|p| (p, i)))
        .collect()
}

fn run(
    table: &TraverseTable,
    name: &str,
    request: &TraverseRequest<'_>,
    skip_root: bool,
    parms: &dyn ParmEvaluator,
    time: f64,
    diagnostics: &Diagnostics,
) -> Result<TraversalResult> {
    let Some(traversal) = table.find(name) else {
        let err = Error::UnknownTraversal(name.to_string());
        diagnostics.error(err.to_string());
        return Err(err);
    };
    let mut opts = traversal.create_options();
    if let Some(opts) = opts.as_mut() {
        opts.configure(parms, time)?;
    }
    traversal.find_prims(request.roots, request.times, request.purposes, skip_root, opts.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PrimPath, StageEdit};
    use crate::parms::ParmMap;
    use crate::stage::{Stage, StageDescription, StageOpts, StageRef};
    use crate::traverse::{StdTraversal, Traversal, TraversalOptions};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn stage() -> StageRef {
        let desc: StageDescription = serde_json::from_value(json!({
            "prims": [
                { "name": "a", "type": "Xform", "kind": "component", "children": [
                    { "name": "m1", "type": "Mesh" },
                    { "name": "g", "type": "Xform", "children": [ { "name": "m2", "type": "Mesh" } ] }
                ] },
                { "name": "b", "type": "Xform", "kind": "assembly", "children": [
                    { "name": "c", "type": "Xform", "kind": "component", "children": [
                        { "name": "m3", "type": "Mesh", "purpose": "render" }
                    ] }
                ] },
                { "name": "m4", "type": "Mesh" }
            ]
        }))
        .unwrap();
        Arc::new(Stage::compose("t.usd", &desc, &StageOpts::load_all(), &StageEdit::default()).unwrap())
    }

    fn roots(stage: &StageRef, paths: &[&str]) -> Vec<Option<Prim>> {
        paths.iter().map(|p| Prim::at_path(stage, &PrimPath::new(p).unwrap())).collect()
    }

    /// Boundable traversal that counts its invocations.
    struct Counting {
        inner: StdTraversal,
        calls: Arc<AtomicUsize>,
    }

    impl Traversal for Counting {
        fn name(&self) -> &str {
            GPRIM_TRAVERSE_NAME
        }
        fn label(&self) -> &str {
            "Counting"
        }
        fn find_prims(
            &self,
            roots: &[Option<Prim>],
            times: &DefaultArray<TimeCode>,
            purposes: &DefaultArray<PurposeSet>,
            skip_root: bool,
            opts: Option<&dyn TraversalOptions>,
        ) -> Result<TraversalResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.find_prims(roots, times, purposes, skip_root, opts)
        }
    }

    fn counting_table() -> (TraverseTable, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut table = TraverseTable::new();
        table.register(Arc::new(Counting { inner: StdTraversal::boundable(), calls: Arc::clone(&calls) }));
        table.register(Arc::new(StdTraversal::components()));
        (table, calls)
    }

    fn paths(result: &TraversalResult) -> Vec<(String, usize)> {
        result.iter().map(|(p, i)| (p.path().to_string(), *i)).collect()
    }

    #[test]
    fn test_none_is_pass_through() {
        let stage = stage();
        let (table, calls) = counting_table();
        let roots = roots(&stage, &["/a", "/b", "/m4"]);
        let request = TraverseRequest {
            roots: &roots,
            times: &DefaultArray::new(TimeCode::Default),
            purposes: &DefaultArray::new(PurposeSet::default()),
        };
        let result = traverse_for_unpack(&table, NO_TRAVERSE_NAME, &request, false, &ParmMap::new(), 0.0, &Diagnostics::new())
            .unwrap();
        assert_eq!(
            paths(&result),
            vec![("/a".to_string(), 0), ("/b".to_string(), 1), ("/m4".to_string(), 2)]
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_none_to_polygons_runs_one_pass() {
        let stage = stage();
        let (table, calls) = counting_table();
        let roots = roots(&stage, &["/a", "/m4"]);
        let request = TraverseRequest {
            roots: &roots,
            times: &DefaultArray::new(TimeCode::Default),
            purposes: &DefaultArray::new(PurposeSet::default()),
        };
        let result = traverse_for_unpack(&table, NO_TRAVERSE_NAME, &request, true, &ParmMap::new(), 0.0, &Diagnostics::new())
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            paths(&result),
            vec![("/a/m1".to_string(), 0), ("/a/g/m2".to_string(), 0), ("/m4".to_string(), 1)]
        );
    }

    #[test]
    fn test_two_phase_composes_origins() {
        let stage = stage();
        let (table, calls) = counting_table();
        let roots = roots(&stage, &["/m4", "/b", "/missing", "/b"]);
        let purposes = DefaultArray::varying(
            PurposeSet::DEFAULT,
            vec![
                PurposeSet::DEFAULT,
                PurposeSet::DEFAULT,
                PurposeSet::DEFAULT,
                PurposeSet::DEFAULT | PurposeSet::RENDER,
            ],
        );
        let request = TraverseRequest { roots: &roots, times: &DefaultArray::new(TimeCode::Default), purposes: &purposes };
        let result =
            traverse_for_unpack(&table, "std:components", &request, true, &ParmMap::new(), 0.0, &Diagnostics::new())
                .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // Only the root with render purpose reaches the render mesh.
        assert_eq!(paths(&result), vec![("/b/c/m3".to_string(), 3)]);
        assert!(result.iter().all(|(_, i)| *i < roots.len()));
    }

    #[test]
    fn test_boundable_single_pass() {
        let stage = stage();
        let (table, calls) = counting_table();
        let roots = roots(&stage, &["/m4"]);
        let request = TraverseRequest {
            roots: &roots,
            times: &DefaultArray::new(TimeCode::Default),
            purposes: &DefaultArray::new(PurposeSet::default()),
        };
        let result = traverse_for_unpack(&table, GPRIM_TRAVERSE_NAME, &request, true, &ParmMap::new(), 0.0, &Diagnostics::new())
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // skip_root is off for the boundable traversal.
        assert_eq!(paths(&result), vec![("/m4".to_string(), 0)]);
    }

    #[test]
    fn test_unknown_traversal() {
        let stage = stage();
        let (table, _) = counting_table();
        let roots = roots(&stage, &["/a"]);
        let request = TraverseRequest {
            roots: &roots,
            times: &DefaultArray::new(TimeCode::Default),
            purposes: &DefaultArray::new(PurposeSet::default()),
        };
        let diags = Diagnostics::new();
        let err = traverse_for_unpack(&table, "std:bogus", &request, false, &ParmMap::new(), 0.0, &diags).unwrap_err();
        assert!(matches!(err, Error::UnknownTraversal(ref n) if n == "std:bogus"));
        assert!(diags.has_errors());
    }
}
