//! Parameter evaluation.
//!
//! Operators and traversal options read their settings by name through a
//! [`ParmEvaluator`]. [`ParmMap`] is the map-backed evaluator used by the
//! CLI and tests; hosts plug in their own.

use crate::util::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Supplies named parameter values at an evaluation time.
pub trait ParmEvaluator {
    fn eval_string(&self, name: &str, time: f64) -> Option<String>;
    fn eval_int(&self, name: &str, time: f64) -> Option<i64>;
    fn eval_float(&self, name: &str, time: f64) -> Option<f64>;

    /// String parameter, falling back to `default` when absent.
    fn string_or(&self, name: &str, time: f64, default: &str) -> String {
        self.eval_string(name, time).unwrap_or_else(|| default.to_string())
    }

    fn int_or(&self, name: &str, time: f64, default: i64) -> i64 {
        self.eval_int(name, time).unwrap_or(default)
    }

    fn float_or(&self, name: &str, time: f64, default: f64) -> f64 {
        self.eval_float(name, time).unwrap_or(default)
    }

    fn bool_or(&self, name: &str, time: f64, default: bool) -> bool {
        self.eval_int(name, time).map_or(default, |v| v != 0)
    }

    /// String parameter that must be present.
    fn require_string(&self, name: &str, time: f64) -> Result<String> {
        self.eval_string(name, time)
            .ok_or_else(|| Error::parm(name, "missing string parameter"))
    }
}

/// A single parameter value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParmValue {
    Int(i64),
    Float(f64),
    String(String),
}

impl From<&str> for ParmValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for ParmValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<i64> for ParmValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for ParmValue {
    fn from(v: bool) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for ParmValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

/// Constant (time-independent) parameter values by name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParmMap {
    values: BTreeMap<String, ParmValue>,
}

impl ParmMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<ParmValue>) -> &mut Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Chainable form of [`set`](Self::set).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParmValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParmValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl ParmEvaluator for ParmMap {
    fn eval_string(&self, name: &str, _time: f64) -> Option<String> {
        match self.values.get(name)? {
            ParmValue::String(s) => Some(s.clone()),
            ParmValue::Int(i) => Some(i.to_string()),
            ParmValue::Float(f) => Some(f.to_string()),
        }
    }

    fn eval_int(&self, name: &str, _time: f64) -> Option<i64> {
        match self.values.get(name)? {
            ParmValue::Int(i) => Some(*i),
            ParmValue::Float(f) => Some(*f as i64),
            ParmValue::String(s) => s.trim().parse().ok(),
        }
    }

    fn eval_float(&self, name: &str, _time: f64) -> Option<f64> {
        match self.values.get(name)? {
            ParmValue::Int(i) => Some(*i as f64),
            ParmValue::Float(f) => Some(*f),
            ParmValue::String(s) => s.trim().parse().ok(),
        }
    }
}
