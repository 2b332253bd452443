//! Arrays that are either a broadcast constant or one value per element.

/// A default value plus an optional per-element array.
///
/// When the array is empty the default applies to every element
/// ("constant"); otherwise element `i` reads `array[i]`, falling back to
/// the default past the end.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DefaultArray<T> {
    default: T,
    array: Vec<T>,
}

impl<T: Clone> DefaultArray<T> {
    /// Constant array broadcasting `default`.
    pub fn new(default: T) -> Self {
        Self { default, array: Vec::new() }
    }

    /// Per-element values with a fallback default.
    pub fn varying(default: T, array: Vec<T>) -> Self {
        Self { default, array }
    }

    #[inline]
    pub fn is_varying(&self) -> bool {
        !self.array.is_empty()
    }

    /// Value for element `i`.
    #[inline]
    pub fn get(&self, i: usize) -> &T {
        self.array.get(i).unwrap_or(&self.default)
    }

    #[inline]
    pub fn default_value(&self) -> &T {
        &self.default
    }

    #[inline]
    pub fn array(&self) -> &[T] {
        &self.array
    }

    pub fn array_mut(&mut self) -> &mut Vec<T> {
        &mut self.array
    }

    /// Make the array constant.
    pub fn set_constant(&mut self, value: T) {
        self.default = value;
        self.array.clear();
    }

    /// Re-expand to align with traversal results, keyed by origin index.
    pub fn remapped<P>(&self, pairs: &[(P, usize)]) -> Self {
        if !self.is_varying() {
            return Self::new(self.default.clone());
        }
        Self::varying(self.default.clone(), remap_array(pairs, &self.array, &self.default))
    }
}

/// Build `dst[i] = src[pairs[i].1]`; origins outside `src` yield `default`.
pub fn remap_array<P, T: Clone>(pairs: &[(P, usize)], src: &[T], default: &T) -> Vec<T> {
    pairs
        .iter()
        .map(|(_, origin)| src.get(*origin).unwrap_or(default).clone())
        .collect()
}
