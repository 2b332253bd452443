//! Name patterns used for primvar, attribute and type filters.
//!
//! A pattern is a whitespace separated list of glob tokens (`*`, `?`).
//! Tokens prefixed with `^` remove matches added by earlier tokens, so
//! `"* ^P"` selects everything except `P`.

/// Compiled name pattern.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Pattern {
    tokens: Vec<(bool, String)>,
}

impl Pattern {
    pub fn new(pattern: &str) -> Self {
        let tokens = pattern
            .split_whitespace()
            .map(|t| match t.strip_prefix('^') {
                Some(rest) => (false, rest.to_string()),
                None => (true, t.to_string()),
            })
            .collect();
        Self { tokens }
    }

    /// Pattern matching every name.
    pub fn all() -> Self {
        Self::new("*")
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Later tokens override earlier ones.
    pub fn matches(&self, name: &str) -> bool {
        let mut selected = false;
        for (include, glob) in &self.tokens {
            if glob_match(glob.as_bytes(), name.as_bytes()) {
                selected = *include;
            }
        }
        selected
    }
}

fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && (pattern[p] == b'?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == b'*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == b'*')
}

/// Attribute names must be valid identifiers.
pub fn is_valid_attrib_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
