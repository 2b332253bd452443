//! Registry of named traversals.

use super::{CustomTraversal, StdTraversal, Traversal};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Pass-through: roots are used as they are and no traversal runs.
pub const NO_TRAVERSE_NAME: &str = "none";

/// Descends to the first geometry-bearing prim. The default traversal.
pub const GPRIM_TRAVERSE_NAME: &str = "std:boundable";

/// Name to traversal map.
///
/// Filled with [`register`](Self::register) while the host starts up and
/// shared immutably (usually behind an `Arc`) afterwards.
#[derive(Clone, Default)]
pub struct TraverseTable {
    traversals: BTreeMap<String, Arc<dyn Traversal>>,
}

impl TraverseTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// A table holding the standard traversals.
    pub fn with_std() -> Self {
        let mut table = Self::new();
        table.register(Arc::new(StdTraversal::boundable()));
        table.register(Arc::new(StdTraversal::components()));
        table.register(Arc::new(StdTraversal::groups()));
        table.register(Arc::new(StdTraversal::assemblies()));
        table.register(Arc::new(StdTraversal::subcomponents()));
        table.register(Arc::new(CustomTraversal));
        table
    }

    /// Register a traversal under its name.
    ///
    /// Returns false (and leaves the table unchanged) when the name is taken
    /// or is the reserved pass-through name.
    pub fn register(&mut self, traversal: Arc<dyn Traversal>) -> bool {
        let name = traversal.name().to_string();
        if name == NO_TRAVERSE_NAME || self.traversals.contains_key(&name) {
            tracing::warn!(name, "traversal not registered");
            return false;
        }
        self.traversals.insert(name, traversal);
        true
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn Traversal>> {
        self.traversals.get(name).cloned()
    }

    /// The default (boundable) traversal, when registered.
    pub fn default_traversal(&self) -> Option<Arc<dyn Traversal>> {
        self.find(GPRIM_TRAVERSE_NAME)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.traversals.keys().map(String::as_str).collect()
    }

    /// `(name, label)` menu entries: pass-through first, then sorted names.
    pub fn menu(&self) -> Vec<(String, String)> {
        std::iter::once((NO_TRAVERSE_NAME.to_string(), "No Traversal".to_string()))
            .chain(self.traversals.iter().map(|(n, t)| (n.clone(), t.label().to_string())))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.traversals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traversals.is_empty()
    }
}

impl fmt::Debug for TraverseTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.traversals.keys()).finish()
    }
}
