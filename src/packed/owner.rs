//! Owner-level setters for packed primitives stored in a [`Detail`].
//!
//! Changing an identifying field through the detail dirties its topology
//! and re-places the primitive with the prim's new world transform.

use super::handle::PackedUsd;
use crate::core::{PrimPath, PurposeSet, TimeCode};
use crate::geom::Detail;
use crate::stage::StageCache;
use crate::util::Diagnostics;

impl Detail {
    fn handle_mut(&mut self, offset: usize) -> &mut PackedUsd {
        match self.packed_mut(offset) {
            Some(p) => p.handle_mut(),
            None => panic!("primitive {offset} is not packed"),
        }
    }

    fn update_packed(
        &mut self,
        offset: usize,
        cache: &StageCache,
        diagnostics: &Diagnostics,
        set: impl FnOnce(&mut PackedUsd) -> bool,
    ) -> bool {
        if !set(self.handle_mut(offset)) {
            return false;
        }
        self.bump_topology();
        self.update_packed_transform(offset, cache, diagnostics);
        true
    }

    /// Re-place a packed primitive with its prim's world transform.
    ///
    /// # Panics
    /// If `offset` is not a packed primitive.
    pub fn update_packed_transform(&mut self, offset: usize, cache: &StageCache, diagnostics: &Diagnostics) {
        let xform = self.handle_mut(offset).world_transform(cache, diagnostics);
        self.set_packed_transform(offset, xform);
    }

    pub fn set_packed_file(
        &mut self,
        offset: usize,
        file: &str,
        cache: &StageCache,
        diagnostics: &Diagnostics,
    ) -> bool {
        self.update_packed(offset, cache, diagnostics, |h| h.set_file(file))
    }

    pub fn set_packed_prim_path(
        &mut self,
        offset: usize,
        path: PrimPath,
        cache: &StageCache,
        diagnostics: &Diagnostics,
    ) -> bool {
        self.update_packed(offset, cache, diagnostics, |h| h.set_prim_path(path))
    }

    pub fn set_packed_frame(
        &mut self,
        offset: usize,
        frame: TimeCode,
        cache: &StageCache,
        diagnostics: &Diagnostics,
    ) -> bool {
        self.update_packed(offset, cache, diagnostics, |h| h.set_frame(frame))
    }

    pub fn set_packed_purposes(
        &mut self,
        offset: usize,
        purposes: PurposeSet,
        cache: &StageCache,
        diagnostics: &Diagnostics,
    ) -> bool {
        self.update_packed(offset, cache, diagnostics, |h| h.set_purposes(purposes))
    }
}

#[cfg(test)]
mod tests {
    use crate::core::{PrimPath, TimeCode};
    use crate::geom::Detail;
    use crate::packed::PackedUsdBuilder;
    use crate::stage::{MemoryStageOpener, StageCache, StageDescription};
    use crate::util::{DVec3, Diagnostics};
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_owner_setters_dirty_topology() {
        let opener = MemoryStageOpener::new();
        let desc: StageDescription = serde_json::from_value(json!({
            "prims": [
                { "name": "a", "type": "Xform", "xform": { "default": { "translate": [1, 0, 0] } } },
                { "name": "b", "type": "Xform",
                  "xform": { "samples": [[1.0, { "translate": [0, 2, 0] }], [2.0, { "translate": [0, 4, 0] }]] } }
            ]
        }))
        .unwrap();
        opener.insert("a.usd", desc);
        let cache = StageCache::new(Arc::new(opener));
        let diags = Diagnostics::new();

        let mut detail = Detail::new();
        let offset = PackedUsdBuilder::new("a.usd", PrimPath::new("/a").unwrap())
            .build(&mut detail, &cache, &diags);
        assert_eq!(detail.packed(offset).unwrap().position(), DVec3::X);

        let serial = detail.topology_serial();
        assert!(!detail.set_packed_prim_path(offset, PrimPath::new("/a").unwrap(), &cache, &diags));
        assert_eq!(detail.topology_serial(), serial);

        assert!(detail.set_packed_prim_path(offset, PrimPath::new("/b").unwrap(), &cache, &diags));
        assert!(detail.topology_serial() > serial);
        assert!(detail.set_packed_frame(offset, TimeCode::Frame(2.0), &cache, &diags));
        assert_eq!(detail.packed(offset).unwrap().position(), DVec3::new(0.0, 4.0, 0.0));
        assert_eq!(detail.point(detail.packed(offset).unwrap().point()), DVec3::new(0.0, 4.0, 0.0));
    }

    #[test]
    #[should_panic(expected = "not packed")]
    fn test_owner_setter_on_polygon_panics() {
        let cache = StageCache::new(Arc::new(MemoryStageOpener::new()));
        let mut detail = Detail::new();
        let p = detail.append_points(&[DVec3::ZERO, DVec3::X, DVec3::Y]);
        detail.append_polygon(&p.collect::<Vec<_>>());
        detail.set_packed_file(0, "x.usd", &cache, &Diagnostics::new());
    }
}
