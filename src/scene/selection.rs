//! Highlight and selection state.
//!
//! Both are id sets. The highlight is transient (hover, pick preview); the
//! selection is combined with it through set operations. Every selection
//! change made with `stash` enabled is pushed onto a history that can be
//! walked with [`SceneRegistry::recall_prev_selection`] and
//! [`SceneRegistry::recall_next_selection`].

use super::registry::{EntityKind, SceneRegistry};
use crate::core::PrimPath;
use crate::stage::Prim;
use std::collections::BTreeSet;

/// Selections kept for recall.
const STASH_LIMIT: usize = 32;

type IdSet = BTreeSet<i32>;

#[derive(Default)]
pub(crate) struct SelectionState {
    highlight: IdSet,
    selection: IdSet,
    highlight_id: i64,
    selection_id: i64,
    history: Vec<IdSet>,
    cursor: Option<usize>,
}

impl SelectionState {
    /// Replace the selection. Returns false when nothing changed.
    fn make_selection(&mut self, selection: IdSet, stash: bool) -> bool {
        if selection == self.selection {
            return false;
        }
        if stash {
            let keep = self.cursor.map_or(0, |c| c + 1);
            self.history.truncate(keep);
            self.history.push(selection.clone());
            if self.history.len() > STASH_LIMIT {
                self.history.remove(0);
            }
            self.cursor = Some(self.history.len() - 1);
        }
        self.selection = selection;
        self.selection_id += 1;
        true
    }

    fn set_highlight(&mut self, highlight: IdSet) -> bool {
        if highlight == self.highlight {
            return false;
        }
        self.highlight = highlight;
        self.highlight_id += 1;
        true
    }
}

impl SceneRegistry {
    // ------------------------------------------------------------------------
    // Highlight
    // ------------------------------------------------------------------------

    pub fn add_to_highlight(&self, id: i32) -> bool {
        let mut state = self.selection.lock();
        let mut highlight = state.highlight.clone();
        highlight.insert(id);
        state.set_highlight(highlight)
    }

    /// Highlight `path`, registering it when unknown.
    pub fn add_path_to_highlight(&self, path: &str) -> bool {
        let id = self.get_or_create_id(path, EntityKind::Path);
        self.add_to_highlight(id)
    }

    /// Highlight one instance of an instanced prim.
    pub fn add_instance_to_highlight(&self, instance_path: &str) -> bool {
        let id = self.get_or_create_id(instance_path, EntityKind::Instance);
        self.add_to_highlight(id)
    }

    pub fn clear_highlight(&self) -> bool {
        self.selection.lock().set_highlight(IdSet::new())
    }

    pub fn has_highlight(&self) -> bool {
        !self.selection.lock().highlight.is_empty()
    }

    pub fn is_highlighted(&self, id: i32) -> bool {
        self.selection.lock().highlight.contains(&id)
    }

    /// Bumped on every highlight change.
    pub fn highlight_id(&self) -> i64 {
        self.selection.lock().highlight_id
    }

    // ------------------------------------------------------------------------
    // Highlight / selection algebra
    // ------------------------------------------------------------------------

    fn combine(&self, stash: bool, op: impl FnOnce(&IdSet, &IdSet) -> IdSet) -> bool {
        let mut state = self.selection.lock();
        let next = op(&state.selection, &state.highlight);
        state.make_selection(next, stash)
    }

    pub fn set_highlight_as_selection(&self, stash: bool) -> bool {
        self.combine(stash, |_, hl| hl.clone())
    }

    pub fn add_highlight_to_selection(&self, stash: bool) -> bool {
        self.combine(stash, |sel, hl| sel | hl)
    }

    pub fn remove_highlight_from_selection(&self, stash: bool) -> bool {
        self.combine(stash, |sel, hl| sel - hl)
    }

    /// Symmetric difference of selection and highlight.
    pub fn toggle_highlight_in_selection(&self, stash: bool) -> bool {
        self.combine(stash, |sel, hl| sel ^ hl)
    }

    pub fn intersect_highlight_with_selection(&self, stash: bool) -> bool {
        self.combine(stash, |sel, hl| sel & hl)
    }

    pub fn clear_selection(&self, stash: bool) -> bool {
        self.combine(stash, |_, _| IdSet::new())
    }

    // ------------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------------

    /// Select exactly `paths`, registering unknown ones.
    pub fn set_selection<S: AsRef<str>>(&self, paths: &[S], stash: bool) -> bool {
        let ids: IdSet = paths
            .iter()
            .map(|p| self.get_or_create_id(p.as_ref(), EntityKind::Path))
            .collect();
        self.selection.lock().make_selection(ids, stash)
    }

    /// Selected paths, sorted.
    pub fn selection_list(&self) -> Vec<String> {
        let ids = self.selection.lock().selection.clone();
        let mut paths: Vec<String> = ids.into_iter().filter_map(|id| self.lookup_path(id)).collect();
        paths.sort();
        paths
    }

    pub fn has_selection(&self) -> bool {
        !self.selection.lock().selection.is_empty()
    }

    pub fn is_selected(&self, id: i32) -> bool {
        self.selection.lock().selection.contains(&id)
    }

    /// Bumped on every selection change.
    pub fn selection_id(&self) -> i64 {
        self.selection.lock().selection_id
    }

    /// Drop selected instances, keeping whole prims.
    pub fn remove_instance_selections(&self) -> bool {
        self.retain_selected(|kind| kind != Some(EntityKind::Instance))
    }

    /// Drop selected prims, keeping instances.
    pub fn remove_prim_selections(&self) -> bool {
        self.retain_selected(|kind| kind == Some(EntityKind::Instance))
    }

    fn retain_selected(&self, keep: impl Fn(Option<EntityKind>) -> bool) -> bool {
        let current = self.selection.lock().selection.clone();
        let next: IdSet = current.into_iter().filter(|&id| keep(self.prim_type(id))).collect();
        self.selection.lock().make_selection(next, false)
    }

    // ------------------------------------------------------------------------
    // Hierarchy
    // ------------------------------------------------------------------------

    fn selected_paths(&self) -> Vec<PrimPath> {
        self.selection_list()
            .iter()
            .filter_map(|p| PrimPath::new(p).ok())
            .collect()
    }

    fn select_paths(&self, paths: Vec<PrimPath>, stash: bool) -> bool {
        let paths: Vec<&str> = paths.iter().map(PrimPath::as_str).collect();
        self.set_selection(&paths, stash)
    }

    fn stage_prim(&self, path: &PrimPath) -> Option<Prim> {
        let stage = self.stage.read().clone()?;
        Prim::at_path(&stage, path)
    }

    /// Replace each selected path with its parent. Top-level prims stay.
    pub fn select_parents(&self, stash: bool) -> bool {
        let parents = self
            .selected_paths()
            .into_iter()
            .map(|p| {
                let parent = p.parent();
                if parent.is_empty() || parent.is_root() { p } else { parent }
            })
            .collect();
        self.select_paths(parents, stash)
    }

    /// Replace each selected prim with its first child, or all children.
    /// Leaves stay selected. Needs a stage.
    pub fn select_children(&self, all_children: bool, stash: bool) -> bool {
        if self.stage.read().is_none() {
            return false;
        }
        let mut next = Vec::new();
        for path in self.selected_paths() {
            let children: Vec<PrimPath> = match self.stage_prim(&path) {
                Some(prim) => prim.children().map(|c| c.path().clone()).collect(),
                None => Vec::new(),
            };
            match (children.is_empty(), all_children) {
                (true, _) => next.push(path),
                (false, true) => next.extend(children),
                (false, false) => next.extend(children.into_iter().take(1)),
            }
        }
        self.select_paths(next, stash)
    }

    /// Move each selected prim to its next (or previous) sibling, wrapping.
    pub fn select_siblings(&self, next_sibling: bool, stash: bool) -> bool {
        if self.stage.read().is_none() {
            return false;
        }
        let mut next = Vec::new();
        for path in self.selected_paths() {
            let siblings: Vec<PrimPath> = self
                .stage_prim(&path)
                .and_then(|p| p.parent())
                .map(|parent| parent.children().map(|c| c.path().clone()).collect())
                .unwrap_or_default();
            let moved = siblings.iter().position(|s| *s == path).map(|i| {
                let n = siblings.len();
                let j = if next_sibling { (i + 1) % n } else { (i + n - 1) % n };
                siblings[j].clone()
            });
            next.push(moved.unwrap_or(path));
        }
        self.select_paths(next, stash)
    }

    // ------------------------------------------------------------------------
    // Stash
    // ------------------------------------------------------------------------

    pub fn recall_prev_selection(&self) -> bool {
        let mut state = self.selection.lock();
        match state.cursor {
            Some(c) if c > 0 => {
                state.cursor = Some(c - 1);
                let recalled = state.history[c - 1].clone();
                state.make_selection(recalled, false);
                true
            }
            _ => false,
        }
    }

    pub fn recall_next_selection(&self) -> bool {
        let mut state = self.selection.lock();
        match state.cursor {
            Some(c) if c + 1 < state.history.len() => {
                state.cursor = Some(c + 1);
                let recalled = state.history[c + 1].clone();
                state.make_selection(recalled, false);
                true
            }
            _ => false,
        }
    }

    pub fn clear_stashed_selections(&self) {
        let mut state = self.selection.lock();
        state.history.clear();
        state.cursor = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageEdit;
    use crate::stage::{Stage, StageDescription, StageOpts};
    use serde_json::json;
    use std::sync::Arc;

    fn scene_with_stage() -> SceneRegistry {
        let desc: StageDescription = serde_json::from_value(json!({
            "prims": [ { "name": "world", "type": "Xform", "children": [
                { "name": "a", "type": "Xform", "children": [
                    { "name": "m1", "type": "Mesh" }, { "name": "m2", "type": "Mesh" } ] },
                { "name": "b", "type": "Xform" },
                { "name": "c", "type": "Xform" } ] } ]
        }))
        .unwrap();
        let stage = Stage::compose("scene.usd", &desc, &StageOpts::load_all(), &StageEdit::default()).unwrap();
        let scene = SceneRegistry::new();
        scene.set_stage(Some(Arc::new(stage)));
        scene
    }

    #[test]
    fn test_highlight_algebra() {
        let scene = SceneRegistry::new();
        let a = scene.add_geometry("/a").id;
        let b = scene.add_geometry("/b").id;
        let c = scene.add_geometry("/c").id;

        assert!(scene.set_selection(&["/a", "/b"], false));
        assert!(scene.add_to_highlight(b));
        assert!(scene.add_to_highlight(c));
        assert!(!scene.add_to_highlight(c));
        assert_eq!(scene.highlight_id(), 2);

        let mut sel = scene.selection_id();
        assert!(scene.toggle_highlight_in_selection(false));
        assert_eq!(scene.selection_list(), vec!["/a", "/c"]);
        assert!(scene.selection_id() > sel);

        assert!(scene.intersect_highlight_with_selection(false));
        assert!(scene.is_selected(c) && !scene.is_selected(a));

        assert!(scene.add_highlight_to_selection(false));
        assert_eq!(scene.selection_list(), vec!["/b", "/c"]);
        sel = scene.selection_id();
        assert!(!scene.add_highlight_to_selection(false));
        assert_eq!(scene.selection_id(), sel);

        assert!(scene.remove_highlight_from_selection(false));
        assert!(!scene.has_selection());
        assert!(scene.set_highlight_as_selection(false));
        assert_eq!(scene.selection_list(), vec!["/b", "/c"]);

        assert!(scene.clear_highlight());
        assert!(!scene.has_highlight());
        assert!(scene.clear_selection(false));
        assert!(!scene.clear_selection(false));
    }

    #[test]
    fn test_stash_recall() {
        let scene = SceneRegistry::new();
        assert!(!scene.recall_prev_selection());
        scene.set_selection(&["/a"], true);
        scene.set_selection(&["/b"], true);
        scene.set_selection(&["/c"], true);

        assert!(scene.recall_prev_selection());
        assert!(scene.recall_prev_selection());
        assert_eq!(scene.selection_list(), vec!["/a"]);
        assert!(!scene.recall_prev_selection());
        assert!(scene.recall_next_selection());
        assert_eq!(scene.selection_list(), vec!["/b"]);

        // A new stashed selection drops the forward history.
        scene.set_selection(&["/d"], true);
        assert!(!scene.recall_next_selection());
        assert!(scene.recall_prev_selection());
        assert_eq!(scene.selection_list(), vec!["/b"]);

        scene.clear_stashed_selections();
        assert!(!scene.recall_prev_selection());
        assert!(!scene.recall_next_selection());
    }

    #[test]
    fn test_instances_and_prims() {
        let scene = SceneRegistry::new();
        scene.add_geometry("/inst");
        assert!(scene.add_instance_to_highlight("/inst[2]"));
        assert!(scene.add_path_to_highlight("/inst"));
        scene.set_highlight_as_selection(false);
        assert!(scene.remove_instance_selections());
        assert_eq!(scene.selection_list(), vec!["/inst"]);

        scene.set_highlight_as_selection(false);
        assert!(scene.remove_prim_selections());
        assert_eq!(scene.selection_list(), vec!["/inst[2]"]);
    }

    #[test]
    fn test_hierarchy_selection() {
        let scene = scene_with_stage();
        scene.set_selection(&["/world/a/m2", "/world"], false);
        assert!(scene.select_parents(false));
        assert_eq!(scene.selection_list(), vec!["/world", "/world/a"]);

        scene.set_selection(&["/world"], false);
        assert!(scene.select_children(false, false));
        assert_eq!(scene.selection_list(), vec!["/world/a"]);
        assert!(scene.select_children(true, false));
        assert_eq!(scene.selection_list(), vec!["/world/a/m1", "/world/a/m2"]);
        assert!(!scene.select_children(true, false));

        scene.set_selection(&["/world/c"], false);
        assert!(scene.select_siblings(true, false));
        assert_eq!(scene.selection_list(), vec!["/world/a"]);
        assert!(scene.select_siblings(false, false));
        assert_eq!(scene.selection_list(), vec!["/world/c"]);
    }

    #[test]
    fn test_children_need_stage() {
        let scene = SceneRegistry::new();
        scene.set_selection(&["/world"], false);
        assert!(!scene.select_children(true, false));
        assert!(!scene.select_siblings(true, false));
    }
}
