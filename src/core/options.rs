//! Flat key/value option records.
//!
//! Options are the save/load format of packed prims and the shape of
//! instance keys. Keys are strings, values are a small closed set of types.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// A single option value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    /// JSON `null`. serde_json writes non-finite floats this way, so a
    /// null reads back as NaN through [`Options::get_float`].
    Null,
    Int(i64),
    Float(f64),
    String(String),
    StringArray(Vec<String>),
}

/// Ordered key/value record.
///
/// Uses SmallVec optimization for the common case of few entries.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Options {
    entries: SmallVec<[(String, OptionValue); 8]>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, replacing an existing key in place.
    pub fn set(&mut self, key: impl Into<String>, value: OptionValue) {
        let key = key.into();
        for (k, v) in &mut self.entries {
            if *k == key {
                *v = value;
                return;
            }
        }
        self.entries.push((key, value));
    }

    pub fn set_string(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.set(key, OptionValue::String(value.into()));
    }

    pub fn set_int(&mut self, key: impl Into<String>, value: i64) {
        self.set(key, OptionValue::Int(value));
    }

    pub fn set_float(&mut self, key: impl Into<String>, value: f64) {
        self.set(key, OptionValue::Float(value));
    }

    pub fn set_string_array(&mut self, key: impl Into<String>, value: Vec<String>) {
        self.set(key, OptionValue::StringArray(value));
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            OptionValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer value; whole floats are accepted.
    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            OptionValue::Int(i) => Some(*i),
            OptionValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    /// Float value; integers are widened.
    pub fn get_float(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            OptionValue::Float(f) => Some(*f),
            OptionValue::Int(i) => Some(*i as f64),
            OptionValue::Null => Some(f64::NAN),
            _ => None,
        }
    }

    pub fn get_string_array(&self, key: &str) -> Option<&[String]> {
        match self.get(key)? {
            OptionValue::StringArray(a) => Some(a),
            _ => None,
        }
    }

    /// First key in `aliases` holding a string.
    pub fn import_string(&self, aliases: &[&str]) -> Option<&str> {
        aliases.iter().find_map(|k| self.get_string(k))
    }

    /// First key in `aliases` holding an integer.
    pub fn import_int(&self, aliases: &[&str]) -> Option<i64> {
        aliases.iter().find_map(|k| self.get_int(k))
    }

    /// First key in `aliases` holding a number.
    pub fn import_float(&self, aliases: &[&str]) -> Option<f64> {
        aliases.iter().find_map(|k| self.get_float(k))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn remove(&mut self, key: &str) -> Option<OptionValue> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter().map(|(k, v)| (k, v))).finish()
    }
}

impl FromIterator<(String, OptionValue)> for Options {
    fn from_iter<T: IntoIterator<Item = (String, OptionValue)>>(iter: T) -> Self {
        let mut opts = Self::new();
        for (k, v) in iter {
            opts.set(k, v);
        }
        opts
    }
}
