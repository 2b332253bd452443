//! Scene registry under concurrent sync and draw.

use gusd::scene::{EntityKind, SceneRegistry};
use std::collections::HashSet;

#[test]
fn test_concurrent_adds_get_unique_ids() {
    let scene = SceneRegistry::new();
    std::thread::scope(|s| {
        for t in 0..4 {
            let scene = &scene;
            s.spawn(move || {
                for i in 0..50 {
                    scene.add_display_geometry(&format!("/geo/t{t}/m{i}"));
                    scene.add_light(&format!("/lights/t{t}/l{i}"));
                    // every thread also touches a shared path
                    scene.get_or_create_id("/shared", EntityKind::Path);
                }
            });
        }
    });

    let mut out = Vec::new();
    let mut serial = -1;
    assert!(scene.fill_geometry(&mut out, &mut serial));
    assert_eq!(out.len(), 200);
    let ids: HashSet<i32> = out.iter().map(|p| p.id).collect();
    assert_eq!(ids.len(), 200);
    assert_eq!(serial, scene.geo_serial());
    assert!(!scene.fill_geometry(&mut out, &mut serial));

    let mut lights = Vec::new();
    let mut light_serial = scene.light_serial() - 1;
    assert!(scene.fill_lights(&mut lights, &mut light_serial));
    assert_eq!(lights.len(), 200);
    assert_eq!(scene.id_count(), 401);
}

#[test]
fn test_selection_roundtrip_through_paths() {
    let scene = SceneRegistry::new();
    let a = scene.add_geometry("/b/mesh").id;
    scene.add_geometry("/a/mesh");
    scene.set_selection(&["/b/mesh", "/a/mesh"], true);
    assert_eq!(scene.selection_list(), vec!["/a/mesh", "/b/mesh"]);
    assert!(scene.is_selected(a));

    let before = scene.selection_id();
    assert!(!scene.set_selection(&["/a/mesh", "/b/mesh"], true));
    assert_eq!(scene.selection_id(), before);

    scene.select_parents(true);
    assert_eq!(scene.selection_list(), vec!["/a", "/b"]);
    assert_eq!(scene.prim_type(scene.find_id("/a").unwrap()), Some(EntityKind::Path));
    assert!(scene.recall_prev_selection());
    assert_eq!(scene.selection_list(), vec!["/a/mesh", "/b/mesh"]);
}
