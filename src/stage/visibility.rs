//! Visibility support for stage prims.
//!
//! Prims can author a visibility token that controls whether they and
//! their descendants are displayed. Visibility can be:
//! - Inherited: defer to the parent
//! - Invisible: hidden, together with the whole subtree
//!
//! The computed visibility of a prim walks up the hierarchy: a prim is
//! invisible when it or any ancestor authors `invisible` at that time.

use crate::core::TimeCode;
use crate::stage::Prim;
use serde::{Deserialize, Serialize};

/// Visibility attribute name, also used for the unpacked primitive attribute.
pub const VISIBILITY_PROPERTY_NAME: &str = "visibility";

/// Authored visibility state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Visibility is deferred to the parent.
    /// If the pseudo-root is reached, the prim is visible.
    #[default]
    Inherited,

    /// Prim and its subtree are hidden.
    Invisible,
}

impl Visibility {
    /// Parse from a token.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "inherited" => Some(Self::Inherited),
            "invisible" => Some(Self::Invisible),
            _ => None,
        }
    }

    /// Token form, as stored in attributes.
    pub fn as_token(self) -> &'static str {
        match self {
            Self::Inherited => "inherited",
            Self::Invisible => "invisible",
        }
    }

    /// Check if this is explicitly hidden.
    pub fn is_invisible(self) -> bool {
        matches!(self, Self::Invisible)
    }
}

/// Authored visibility of one prim at `time`, or `None` if not authored.
pub fn authored_visibility(prim: &Prim, time: TimeCode) -> Option<Visibility> {
    prim.data().visibility.as_ref()?.get(time).copied()
}

/// Check whether the prim is visible, walking up its ancestors.
pub fn is_visible(prim: &Prim, time: TimeCode) -> bool {
    !is_invisible_in_stage(prim, time)
}

/// Check if the prim or any ancestor is explicitly invisible.
pub fn is_invisible_in_stage(prim: &Prim, time: TimeCode) -> bool {
    let mut current = Some(prim.clone());
    while let Some(p) = current {
        if authored_visibility(&p, time).is_some_and(Visibility::is_invisible) {
            return true;
        }
        current = p.parent();
    }
    false
}
