//! Time codes and time-sampled values.
//!
//! Stage properties are either a single default value or a set of samples
//! keyed by frame. Lookups use held interpolation: the sample at or before
//! the requested frame wins, frames before the first sample clamp to it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Time at which a stage is evaluated.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum TimeCode {
    /// The non-animated ("default") value of every property.
    #[default]
    Default,
    /// A frame number.
    Frame(f64),
}

impl TimeCode {
    /// Numeric form; `Default` is NaN.
    #[inline]
    pub fn numeric(self) -> f64 {
        match self {
            Self::Default => f64::NAN,
            Self::Frame(f) => f,
        }
    }

    /// Inverse of [`numeric`](Self::numeric).
    #[inline]
    pub fn from_numeric(value: f64) -> Self {
        if value.is_nan() { Self::Default } else { Self::Frame(value) }
    }

    #[inline]
    pub fn is_default(self) -> bool {
        matches!(self, Self::Default)
    }

    /// Stable bit pattern used for hashing (`0.0` and `-0.0` collapse).
    #[inline]
    pub fn bits(self) -> u64 {
        match self {
            Self::Default => u64::MAX,
            Self::Frame(f) if f == 0.0 => 0,
            Self::Frame(f) => f.to_bits(),
        }
    }
}

impl From<f64> for TimeCode {
    fn from(frame: f64) -> Self {
        Self::from_numeric(frame)
    }
}

impl fmt::Display for TimeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("DEFAULT"),
            Self::Frame(frame) => write!(f, "{frame}"),
        }
    }
}

/// A property value with optional time samples.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Sampled<T> {
    #[serde(default = "Option::default")]
    pub default: Option<T>,
    /// Samples sorted by frame.
    #[serde(default = "Vec::new")]
    pub samples: Vec<(f64, T)>,
}

impl<T> Default for Sampled<T> {
    fn default() -> Self {
        Self { default: None, samples: Vec::new() }
    }
}

impl<T> Sampled<T> {
    /// A constant (non-animated) value.
    pub fn constant(value: T) -> Self {
        Self { default: Some(value), samples: Vec::new() }
    }

    /// Build from unsorted samples.
    pub fn from_samples(default: Option<T>, mut samples: Vec<(f64, T)>) -> Self {
        samples.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { default, samples }
    }

    /// True when a default or any sample was authored.
    pub fn is_authored(&self) -> bool {
        self.default.is_some() || !self.samples.is_empty()
    }

    pub fn is_varying(&self) -> bool {
        self.samples.len() > 1
    }

    /// Convert every authored value; samples come out sorted.
    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> Sampled<U> {
        let default = self.default.as_ref().map(&mut f);
        let samples = self.samples.iter().map(|(t, v)| (*t, f(v))).collect();
        Sampled::from_samples(default, samples)
    }

    /// Value at `time` with held interpolation.
    pub fn get(&self, time: TimeCode) -> Option<&T> {
        let TimeCode::Frame(frame) = time else {
            return self.default.as_ref().or_else(|| self.samples.first().map(|(_, v)| v));
        };
        if self.samples.is_empty() {
            return self.default.as_ref();
        }
        let idx = self.samples.partition_point(|(t, _)| *t <= frame);
        let idx = idx.saturating_sub(1);
        self.samples.get(idx).map(|(_, v)| v)
    }
}
