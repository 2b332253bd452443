//! `std:custom`: a traversal configured from parameters.
//!
//! Parameters (all optional):
//! - `custom_types` - type name pattern, default `*`
//! - `custom_kind` - `any`, `model`, `group`, `assembly`, `component`, `subcomponent`
//! - `custom_purpose` - space separated purposes a match must have
//! - `custom_visible` - only descend visible prims (default on)
//! - `custom_active` - only descend active prims (default on)
//! - `custom_traversematched` - keep descending below matches (default off)

use super::standard::{root_passes, Visit};
use super::{downcast_options, Traversal, TraversalOptions, TraversalResult};
use crate::core::{DefaultArray, Purpose, PurposeSet, TimeCode};
use crate::parms::ParmEvaluator;
use crate::stage::{ModelKind, Prim};
use crate::util::{Error, Pattern, Result};
use std::any::Any;

pub const CUSTOM_TRAVERSE_NAME: &str = "std:custom";

/// Model kind a match must have.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KindFilter {
    #[default]
    Any,
    Model,
    Exact(ModelKind),
}

impl KindFilter {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "" | "any" => Some(Self::Any),
            "model" => Some(Self::Model),
            other => ModelKind::from_token(other).map(Self::Exact),
        }
    }

    fn matches(self, kind: Option<ModelKind>) -> bool {
        match self {
            Self::Any => true,
            Self::Model => kind.is_some_and(ModelKind::is_model),
            Self::Exact(ModelKind::Group) => kind.is_some_and(ModelKind::is_group),
            Self::Exact(k) => kind == Some(k),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CustomOptions {
    pub types: Pattern,
    pub kind: KindFilter,
    /// When set, a match's computed purpose must be in this set.
    pub purposes: Option<PurposeSet>,
    pub visible_only: bool,
    pub active_only: bool,
    pub traverse_matched: bool,
}

impl Default for CustomOptions {
    fn default() -> Self {
        Self {
            types: Pattern::all(),
            kind: KindFilter::Any,
            purposes: None,
            visible_only: true,
            active_only: true,
            traverse_matched: false,
        }
    }
}

impl TraversalOptions for CustomOptions {
    fn configure(&mut self, parms: &dyn ParmEvaluator, time: f64) -> Result<()> {
        if let Some(types) = parms.eval_string("custom_types", time) {
            self.types = Pattern::new(&types);
        }
        if let Some(kind) = parms.eval_string("custom_kind", time) {
            self.kind = KindFilter::from_token(&kind)
                .ok_or_else(|| Error::parm("custom_kind", format!("unknown kind '{kind}'")))?;
        }
        if let Some(names) = parms.eval_string("custom_purpose", time) {
            let names: Vec<&str> = names.split_whitespace().collect();
            self.purposes = (!names.is_empty()).then(|| PurposeSet::from_names(&names));
        }
        self.visible_only = parms.bool_or("custom_visible", time, self.visible_only);
        self.active_only = parms.bool_or("custom_active", time, self.active_only);
        self.traverse_matched = parms.bool_or("custom_traversematched", time, self.traverse_matched);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl CustomOptions {
    fn matches(&self, prim: &Prim) -> bool {
        self.types.matches(prim.type_name())
            && self.kind.matches(prim.kind())
            && self.purposes.map_or(true, |set| set.includes(prim.computed_purpose()))
    }

    fn passes(&self, prim: &Prim, v: &Visit) -> bool {
        if self.active_only && !prim.is_active() {
            return false;
        }
        if self.visible_only && prim.authored_visibility(v.time).is_some_and(|vis| vis.is_invisible()) {
            return false;
        }
        match prim.purpose() {
            Purpose::Default => true,
            p => v.purposes.includes(p),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CustomTraversal;

impl Traversal for CustomTraversal {
    fn name(&self) -> &str {
        CUSTOM_TRAVERSE_NAME
    }

    fn label(&self) -> &str {
        "Custom"
    }

    fn create_options(&self) -> Option<Box<dyn TraversalOptions>> {
        Some(Box::new(CustomOptions::default()))
    }

    #[tracing::instrument(level = "debug", skip_all, fields(roots = roots.len()))]
    fn find_prims(
        &self,
        roots: &[Option<Prim>],
        times: &DefaultArray<TimeCode>,
        purposes: &DefaultArray<PurposeSet>,
        skip_root: bool,
        opts: Option<&dyn TraversalOptions>,
    ) -> Result<TraversalResult> {
        let defaults = CustomOptions::default();
        let opts = match opts {
            Some(o) => downcast_options::<CustomOptions>(o),
            None => &defaults,
        };

        let mut out = TraversalResult::new();
        for (origin, root) in roots.iter().enumerate() {
            let Some(root) = root else { continue };
            let v = Visit { time: *times.get(origin), purposes: *purposes.get(origin), origin };
            if !root_passes(root, &v) {
                continue;
            }
            if !skip_root && opts.matches(root) {
                out.push((root.clone(), origin));
                if !opts.traverse_matched {
                    continue;
                }
            }
            for child in root.children() {
                visit(&child, opts, &v, &mut out);
            }
        }
        Ok(out)
    }
}

fn visit(prim: &Prim, opts: &CustomOptions, v: &Visit, out: &mut TraversalResult) {
    if !opts.passes(prim, v) {
        return;
    }
    if opts.matches(prim) {
        out.push((prim.clone(), v.origin));
        if !opts.traverse_matched {
            return;
        }
    }
    for child in prim.children() {
        visit(&child, opts, v, out);
    }
}
