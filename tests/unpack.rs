//! Integration tests for traversal and unpacking over stages read from disk.

use gusd::core::{remap_array, DefaultArray, PrimPath, PurposeSet, TimeCode};
use gusd::geom::{AttribOwner, Detail};
use gusd::packed::PackedUsdBuilder;
use gusd::parms::ParmMap;
use gusd::stage::{Prim, StageCache, StageOpts};
use gusd::traverse::{Traversal, TraversalOptions, TraversalResult, TraverseTable, GPRIM_TRAVERSE_NAME};
use gusd::unpack::{traverse_for_unpack, TraverseRequest, UnpackUsd};
use gusd::{Context, Diagnostics, Error, Result};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn write_stage(dir: &tempfile::TempDir) -> String {
    let tri = json!({ "default": [[0,0,0],[1,0,0],[0,1,0]] });
    let mesh = |name: &str| {
        json!({ "name": name, "type": "Mesh", "points": tri,
                "faceVertexCounts": [3], "faceVertexIndices": [0, 1, 2] })
    };
    let component = |name: &str| {
        json!({ "name": name, "type": "Xform", "kind": "component",
                "children": [ mesh("body"), mesh("wheel") ] })
    };
    let stage = json!({
        "prims": [ { "name": "set", "type": "Xform", "kind": "assembly",
            "children": [ component("car1"), component("car2"),
                { "name": "props", "type": "Xform", "kind": "group",
                  "children": [ component("cone") ] } ] } ]
    });
    let path = dir.path().join("set.usd");
    std::fs::write(&path, serde_json::to_string(&stage).unwrap()).unwrap();
    path.to_string_lossy().into_owned()
}

fn bind(cache: &StageCache, file: &str, paths: &[&str]) -> Vec<Option<Prim>> {
    let requests: Vec<(String, PrimPath)> = paths
        .iter()
        .map(|p| (file.to_string(), PrimPath::new(p).unwrap()))
        .collect();
    cache.bind_prims(&requests, &StageOpts::load_all(), &Diagnostics::new(), gusd::Severity::Warning)
}

/// Boundable traversal that counts its invocations.
struct Counting {
    inner: Arc<dyn Traversal>,
    calls: AtomicUsize,
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

fn counting_table() -> (TraverseTable, Arc<Counting>) {
    let standard = TraverseTable::with_std();
    let counting = Arc::new(Counting {
        inner: standard.find(GPRIM_TRAVERSE_NAME).unwrap(),
        calls: AtomicUsize::new(0),
    });
    let mut table = TraverseTable::new();
    table.register(counting.clone());
    table.register(standard.find("std:components").unwrap());
    (table, counting)
}

#[test]
fn test_none_passes_roots_through() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_stage(&dir);
    let cache = StageCache::with_file_opener();
    let roots = bind(&cache, &file, &["/set/car1", "/set/car2", "/set/props"]);
    let (table, counting) = counting_table();

    let times = DefaultArray::new(TimeCode::Default);
    let purposes = DefaultArray::new(PurposeSet::default());
    let request = TraverseRequest { roots: &roots, times: &times, purposes: &purposes };
    let found =
        traverse_for_unpack(&table, "none", &request, false, &ParmMap::new(), 0.0, &Diagnostics::new()).unwrap();

    assert_eq!(counting.calls.load(Ordering::SeqCst), 0);
    let paths: Vec<&str> = found.iter().map(|(p, _)| p.path().as_str()).collect();
    assert_eq!(paths, vec!["/set/car1", "/set/car2", "/set/props"]);
    assert_eq!(found.iter().map(|(_, i)| *i).collect::<Vec<_>>(), vec![0, 1, 2]);
}

#[test]
fn test_none_to_polygons_runs_one_boundable_pass() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_stage(&dir);
    let cache = StageCache::with_file_opener();
    let roots = bind(&cache, &file, &["/set/car1", "/set/car2", "/set/props"]);
    let (table, counting) = counting_table();

    let times = DefaultArray::new(TimeCode::Default);
    let purposes = DefaultArray::new(PurposeSet::default());
    let request = TraverseRequest { roots: &roots, times: &times, purposes: &purposes };
    let found =
        traverse_for_unpack(&table, "none", &request, true, &ParmMap::new(), 0.0, &Diagnostics::new()).unwrap();

    assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
    assert_eq!(found.len(), 6);
    assert!(found.iter().all(|(p, _)| p.type_name() == "Mesh"));
}

#[test]
fn test_two_phase_origins_point_at_ancestor_roots() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_stage(&dir);
    let cache = StageCache::with_file_opener();
    let root_paths = ["/set/props", "/nope", "/set"];
    let roots = bind(&cache, &file, &root_paths);
    assert!(roots[1].is_none());
    let (table, counting) = counting_table();

    let times = DefaultArray::new(TimeCode::Frame(1.0));
    let purposes = DefaultArray::varying(PurposeSet::default(), vec![PurposeSet::default(); 3]);
    let request = TraverseRequest { roots: &roots, times: &times, purposes: &purposes };
    let found = traverse_for_unpack(
        &table,
        "std:components",
        &request,
        true,
        &ParmMap::new(),
        1.0,
        &Diagnostics::new(),
    )
    .unwrap();

    assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
    // cone under /set/props, then all three components under /set
    assert_eq!(found.len(), 2 + 6);
    for (prim, origin) in &found {
        assert!(*origin < roots.len());
        let root = PrimPath::new(root_paths[*origin]).unwrap();
        assert!(prim.path().has_prefix(&root), "{} not under {}", prim.path(), root);
    }
    assert_eq!(found[0].1, 0);
    assert!(found[2..].iter().all(|(_, o)| *o == 2));
}

#[test]
fn test_remap_falls_back_to_default() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_stage(&dir);
    let cache = StageCache::with_file_opener();
    let prims = bind(&cache, &file, &["/set/car1", "/set/car2"]);
    let pairs: Vec<(Prim, usize)> = vec![
        (prims[0].clone().unwrap(), 1),
        (prims[1].clone().unwrap(), 7),
        (prims[0].clone().unwrap(), 0),
    ];
    let src = vec![TimeCode::Frame(10.0), TimeCode::Frame(20.0)];
    let remapped = remap_array(&pairs, &src, &TimeCode::Frame(-1.0));
    assert_eq!(remapped, vec![TimeCode::Frame(20.0), TimeCode::Frame(-1.0), TimeCode::Frame(10.0)]);

    let varying = DefaultArray::varying(PurposeSet::GUIDE, vec![PurposeSet::RENDER]).remapped(&pairs);
    assert_eq!(varying.array(), &[PurposeSet::GUIDE, PurposeSet::GUIDE, PurposeSet::RENDER]);
}

#[test]
fn test_unpack_names_share_one_string() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_stage(&dir);
    let ctx = Context::default();
    let diags = Diagnostics::new();

    let mut input = Detail::new();
    for _ in 0..3 {
        PackedUsdBuilder::new(file.as_str(), PrimPath::new("/set").unwrap())
            .build(&mut input, ctx.stage_cache(), &diags);
    }
    let parms = ParmMap::new().with("unpack_traversal", "std:components");
    let out = UnpackUsd::new(&ctx).cook(&input, &parms, 0.0, &diags).unwrap();

    assert_eq!(out.num_primitives(), 9);
    let names = out.find_attrib(AttribOwner::Primitive, "name").unwrap();
    let column = names.strings().unwrap();
    let car1: Vec<i32> = (0..9)
        .filter(|&i| names.get_string(i) == Some("car1"))
        .map(|i| column.string_index(i))
        .collect();
    assert_eq!(car1.len(), 3);
    assert!(car1.iter().all(|&idx| idx == car1[0]));
    assert_eq!(column.table_len(), 3);

    let paths = out.find_attrib(AttribOwner::Primitive, "path").unwrap();
    assert_eq!(paths.get_string(0), Some("/set/car1"));
    assert!(diags.is_empty(), "{diags:?}");
}

#[test]
fn test_unpack_unknown_traversal_fails() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_stage(&dir);
    let ctx = Context::default();
    let diags = Diagnostics::new();

    let mut input = Detail::new();
    PackedUsdBuilder::new(file.as_str(), PrimPath::new("/set").unwrap()).build(&mut input, ctx.stage_cache(), &diags);
    let parms = ParmMap::new().with("unpack_traversal", "std:bogus");
    let err = UnpackUsd::new(&ctx).cook(&input, &parms, 0.0, &diags).unwrap_err();
    assert!(matches!(err, Error::UnknownTraversal(_)));
    assert_eq!(diags.count_matching("std:bogus"), 1);
}
