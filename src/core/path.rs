//! Prim paths with embedded variant selections.
//!
//! Paths are absolute (`/a/b/c`). Any component may carry variant
//! selections, `/set{shape=sphere}mesh` or `/set{shape=sphere}/mesh`;
//! the canonical string uses the first form. Stripping the selections
//! yields the plain path plus a [`StageEdit`] that must be applied to the
//! stage before the plain path can be looked up.

use crate::util::{Error, Result};
use std::fmt;

/// One variant selection encoded in a path.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariantSelection {
    /// Plain path of the prim owning the variant set.
    pub prim_path: String,
    pub set: String,
    pub selection: String,
}

/// Ordered variant selections to apply when composing a stage.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct StageEdit {
    pub selections: Vec<VariantSelection>,
}

impl StageEdit {
    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }

    /// Selection for `set` on the prim at `prim_path`, last one wins.
    pub fn selection_for(&self, prim_path: &str, set: &str) -> Option<&str> {
        self.selections
            .iter()
            .rev()
            .find(|s| s.prim_path == prim_path && s.set == set)
            .map(|s| s.selection.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Component {
    name: String,
    variants: Vec<(String, String)>,
}

/// Absolute scene path, possibly holding variant selections.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PrimPath {
    text: String,
}

impl PrimPath {
    /// Parse and canonicalize a path string.
    pub fn new(path: &str) -> Result<Self> {
        let comps = parse(path)?;
        Ok(Self::from_components(&comps))
    }

    /// The empty path. Used for "no path" slots such as an unset source path.
    pub fn empty() -> Self {
        Self { text: String::new() }
    }

    pub fn root() -> Self {
        Self { text: "/".to_string() }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.text == "/"
    }

    pub fn has_variants(&self) -> bool {
        self.text.contains('{')
    }

    /// Number of components below the root.
    pub fn element_count(&self) -> usize {
        self.components().len()
    }

    /// Last component name, without variant selections.
    pub fn name(&self) -> &str {
        if self.is_empty() || self.is_root() {
            return "";
        }
        let mut end = self.text.len();
        while self.text[..end].ends_with('}') {
            match self.text[..end].rfind('{') {
                Some(open) => end = open,
                None => break,
            }
        }
        let head = &self.text[..end];
        let start = head.rfind(|c| c == '/' || c == '}').map_or(0, |i| i + 1);
        &head[start..]
    }

    /// Parent path. The root and the empty path have an empty parent.
    pub fn parent(&self) -> PrimPath {
        let mut comps = self.components();
        if comps.pop().is_none() {
            return PrimPath::empty();
        }
        Self::from_components(&comps)
    }

    /// Append a child component.
    pub fn append_child(&self, name: &str) -> Result<PrimPath> {
        if !is_valid_name(name) {
            return Err(Error::InvalidPath(format!("{}/{}", self.text, name)));
        }
        let mut comps = self.components();
        comps.push(Component { name: name.to_string(), variants: Vec::new() });
        Ok(Self::from_components(&comps))
    }

    /// Component-wise prefix test (a path is a prefix of itself).
    pub fn has_prefix(&self, prefix: &PrimPath) -> bool {
        if prefix.is_empty() || self.is_empty() {
            return false;
        }
        let mine = self.components();
        let theirs = prefix.components();
        theirs.len() <= mine.len() && mine[..theirs.len()] == theirs[..]
    }

    /// Replace `old` with `new` when `old` prefixes this path.
    pub fn replace_prefix(&self, old: &PrimPath, new: &PrimPath) -> Option<PrimPath> {
        if !self.has_prefix(old) {
            return None;
        }
        let mine = self.components();
        let mut comps = new.components();
        comps.extend_from_slice(&mine[old.components().len()..]);
        Some(Self::from_components(&comps))
    }

    /// Split into the plain path and the variant selections it encodes.
    pub fn strip_variants(&self) -> (PrimPath, StageEdit) {
        let mut plain = Vec::new();
        let mut edit = StageEdit::default();
        for comp in self.components() {
            plain.push(Component { name: comp.name.clone(), variants: Vec::new() });
            let owner = Self::from_components(&plain);
            for (set, selection) in comp.variants {
                edit.selections.push(VariantSelection {
                    prim_path: owner.text.clone(),
                    set,
                    selection,
                });
            }
        }
        if self.is_empty() {
            return (PrimPath::empty(), edit);
        }
        (Self::from_components(&plain), edit)
    }

    fn components(&self) -> Vec<Component> {
        // Canonical text always parses.
        parse(&self.text).unwrap_or_default()
    }

    fn from_components(comps: &[Component]) -> Self {
        let mut text = String::new();
        let mut after_selection = false;
        for comp in comps {
            if !after_selection {
                text.push('/');
            }
            text.push_str(&comp.name);
            for (set, sel) in &comp.variants {
                text.push('{');
                text.push_str(set);
                text.push('=');
                text.push_str(sel);
                text.push('}');
            }
            after_selection = !comp.variants.is_empty();
        }
        if text.is_empty() {
            text.push('/');
        }
        Self { text }
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse(path: &str) -> Result<Vec<Component>> {
    let invalid = || Error::InvalidPath(path.to_string());
    if path.is_empty() {
        return Ok(Vec::new());
    }
    if !path.starts_with('/') {
        return Err(invalid());
    }
    let bytes = path.as_bytes();
    let mut comps = Vec::new();
    let mut i = 1;
    while i < bytes.len() {
        let start = i;
        while i < bytes.len() && bytes[i] != b'/' && bytes[i] != b'{' {
            i += 1;
        }
        let name = &path[start..i];
        if !is_valid_name(name) {
            return Err(invalid());
        }
        let mut variants = Vec::new();
        while i < bytes.len() && bytes[i] == b'{' {
            let close = path[i..].find('}').map(|o| i + o).ok_or_else(invalid)?;
            let body = &path[i + 1..close];
            let (set, sel) = body.split_once('=').ok_or_else(invalid)?;
            if !is_valid_name(set) || !(sel.is_empty() || is_valid_name(sel)) {
                return Err(invalid());
            }
            variants.push((set.to_string(), sel.to_string()));
            i = close + 1;
        }
        comps.push(Component { name: name.to_string(), variants });
        if i < bytes.len() && bytes[i] == b'/' {
            i += 1;
            if i == bytes.len() {
                return Err(invalid());
            }
        }
    }
    Ok(comps)
}

impl fmt::Display for PrimPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl fmt::Debug for PrimPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrimPath({})", self.text)
    }
}

impl std::str::FromStr for PrimPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> PrimPath {
        PrimPath::new(s).unwrap()
    }

    #[test]
    fn test_parse_and_name() {
        assert_eq!(p("/a/b/c").name(), "c");
        assert_eq!(p("/a").parent(), PrimPath::root());
        assert_eq!(p("/a/b").parent(), p("/a"));
        assert!(PrimPath::root().name().is_empty());
        assert!(PrimPath::new("a/b").is_err());
        assert!(PrimPath::new("/a//b").is_err());
        assert!(PrimPath::new("/a/").is_err());
        assert!(PrimPath::new("/a:b").is_err());
    }

    #[test]
    fn test_variant_canonical_form() {
        let a = p("/set{shape=sphere}/mesh");
        let b = p("/set{shape=sphere}mesh");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "/set{shape=sphere}mesh");
        assert_eq!(a.name(), "mesh");
        assert_eq!(p("/set{shape=sphere}").name(), "set");
        assert!(a.has_variants());
    }

    #[test]
    fn test_strip_variants() {
        let (plain, edit) = p("/set{shape=sphere}mesh{lod=high}").strip_variants();
        assert_eq!(plain, p("/set/mesh"));
        assert_eq!(edit.selections.len(), 2);
        assert_eq!(edit.selection_for("/set", "shape"), Some("sphere"));
        assert_eq!(edit.selection_for("/set/mesh", "lod"), Some("high"));

        let (plain, edit) = p("/a/b").strip_variants();
        assert_eq!(plain, p("/a/b"));
        assert!(edit.is_empty());
    }

    #[test]
    fn test_prefix_ops() {
        assert!(p("/a/b/c").has_prefix(&p("/a/b")));
        assert!(p("/a/b").has_prefix(&p("/a/b")));
        assert!(!p("/a/bc").has_prefix(&p("/a/b")));
        assert!(p("/a").has_prefix(&PrimPath::root()));

        let moved = p("/set/mesh").replace_prefix(&p("/set"), &p("/set{shape=sphere}"));
        assert_eq!(moved, Some(p("/set{shape=sphere}mesh")));
        assert_eq!(p("/x").replace_prefix(&p("/set"), &p("/y")), None);
    }

    #[test]
    fn test_append_child() {
        assert_eq!(PrimPath::root().append_child("geo").unwrap(), p("/geo"));
        assert!(p("/geo").append_child("bad name").is_err());
    }
}
