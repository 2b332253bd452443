//! Purposes: visibility categories for prims.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Combination of purposes a consumer wants to see.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct PurposeSet: u32 {
        const DEFAULT = 1 << 0;
        const RENDER = 1 << 1;
        const PROXY = 1 << 2;
        const GUIDE = 1 << 3;
    }
}

impl Default for PurposeSet {
    fn default() -> Self {
        Self::DEFAULT | Self::PROXY
    }
}

impl PurposeSet {
    /// Parse purpose names; unknown names are ignored.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        names
            .iter()
            .filter_map(|n| Purpose::from_token(n.as_ref()))
            .fold(Self::empty(), |acc, p| acc | p.as_set())
    }

    /// Names of the non-default purposes, in `proxy`, `render`, `guide` order.
    pub fn intrinsic_names(self) -> Vec<String> {
        let mut out = Vec::new();
        if self.contains(Self::PROXY) {
            out.push("proxy".to_string());
        }
        if self.contains(Self::RENDER) {
            out.push("render".to_string());
        }
        if self.contains(Self::GUIDE) {
            out.push("guide".to_string());
        }
        out
    }

    /// Number of non-default purposes.
    pub fn num_purposes(self) -> usize {
        (self - Self::DEFAULT).bits().count_ones() as usize
    }

    /// True when a prim with `purpose` is visible under this set.
    #[inline]
    pub fn includes(self, purpose: Purpose) -> bool {
        self.contains(purpose.as_set())
    }
}

/// Purpose authored on a single prim.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    #[default]
    Default,
    Render,
    Proxy,
    Guide,
}

impl Purpose {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "default" => Some(Self::Default),
            "render" => Some(Self::Render),
            "proxy" => Some(Self::Proxy),
            "guide" => Some(Self::Guide),
            _ => None,
        }
    }

    pub fn as_set(self) -> PurposeSet {
        match self {
            Self::Default => PurposeSet::DEFAULT,
            Self::Render => PurposeSet::RENDER,
            Self::Proxy => PurposeSet::PROXY,
            Self::Guide => PurposeSet::GUIDE,
        }
    }
}
