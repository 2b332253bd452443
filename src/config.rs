//! Library configuration.
//!
//! Settings are read from JSON. Lookup order: an explicit path, the
//! `GUSD_CONFIG` environment variable, then `gusd/config.json` under the
//! platform config directory. Missing files yield defaults; unknown keys
//! are ignored and absent keys take their default.

use crate::packed::GeometryCache;
use crate::stage::StageOpts;
use crate::traverse::GPRIM_TRAVERSE_NAME;
use crate::unpack::RefineParms;
use crate::util::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "GUSD_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Traversal used when none is given.
    pub default_traversal: String,
    /// Compose payloads when opening stages.
    pub load_payloads: bool,
    /// Refinement settings for unpacking to polygons.
    pub refine: RefineParms,
    /// Converted geometry terms kept in memory; 0 disables the cache.
    pub geometry_cache_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_traversal: GPRIM_TRAVERSE_NAME.to_string(),
            load_payloads: true,
            refine: RefineParms::default(),
            geometry_cache_capacity: GeometryCache::DEFAULT_CAPACITY,
        }
    }
}

impl Config {
    /// Default location under the platform config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("gusd");
            p.push("config.json");
            p
        })
    }

    /// Read a config file. Unlike [`load`](Self::load), a missing or
    /// malformed file is an error.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Resolve and read the config, falling back to defaults.
    ///
    /// An explicit path must exist. Files found through the environment or
    /// the config directory are skipped with a warning when unreadable.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        let candidate = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .or_else(Self::default_path)
            .filter(|p| p.exists());
        let Some(path) = candidate else {
            return Ok(Self::default());
        };
        match Self::from_file(&path) {
            Ok(config) => {
                tracing::debug!(path = %path.display(), "loaded config");
                Ok(config)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "ignoring config: {e}");
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Options for opening stages.
    pub fn stage_opts(&self) -> StageOpts {
        if self.load_payloads {
            StageOpts::load_all()
        } else {
            StageOpts::load_none()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config() {
        let config: Config = serde_json::from_str(
            r#"{ "default_traversal": "std:components", "refine": { "translate_st_to_uv": false } }"#,
        )
        .unwrap();
        assert_eq!(config.default_traversal, "std:components");
        assert!(!config.refine.translate_st_to_uv);
        assert_eq!(config.refine.primvar_pattern, "*");
        assert_eq!(config.geometry_cache_capacity, GeometryCache::DEFAULT_CAPACITY);
        assert_eq!(config.stage_opts(), StageOpts::load_all());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config { load_payloads: false, geometry_cache_capacity: 8, ..Config::default() };
        config.save(&path).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.stage_opts(), StageOpts::load_none());
    }

    #[test]
    fn test_explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("missing.json"))).unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{ not json").unwrap();
        assert!(matches!(Config::from_file(&bad), Err(Error::Json(_))));
    }
}
