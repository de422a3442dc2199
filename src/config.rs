//! Storage configuration.
//!
//! Configuration can be loaded from:
//! 1. TOML file (`[storage]` table)
//! 2. Environment variables (`CM_*`)
//!
//! Environment variables override TOML configuration. Components never read
//! the environment themselves: they receive a [`StorageConfig`] at
//! construction.
//!
//! # Example TOML Configuration
//!
//! ```toml
//! [storage]
//! raster_root = "/srv/cache/rasters"
//! vector_root = "/srv/cache/vectors"
//! cm_outputs_root = "/srv/cm_outputs"
//! shard_depth = 4
//! shard_width = 2
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config '{path}': {source}")]
    Io {
        /// Path of the configuration file.
        path: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(String),

    /// A value is syntactically valid but unusable.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Roots and sharding parameters of the artifact store.
///
/// # Defaults
///
/// | Setting           | Default              | Env override          |
/// |-------------------|----------------------|-----------------------|
/// | `raster_root`     | `./data/rasters`     | `CM_RASTER_CACHE_DIR` |
/// | `vector_root`     | `./data/vectors`     | `CM_VECTOR_CACHE_DIR` |
/// | `cm_outputs_root` | `./data/cm_outputs`  | `CM_OUTPUTS_DIR`      |
/// | `shard_depth`     | 4                    | `CM_SHARD_DEPTH`      |
/// | `shard_width`     | 2                    | `CM_SHARD_WIDTH`      |
///
/// The default 4 x 2 sharding reproduces the on-disk layout
/// `<cm>/01/23/45/67/<task_id>` of existing deployments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one sub-directory per raster dataset layer.
    pub raster_root: PathBuf,

    /// Directory holding one sub-directory per vector dataset layer.
    pub vector_root: PathBuf,

    /// Directory holding the sharded task directories.
    pub cm_outputs_root: PathBuf,

    /// Number of shard directory levels above a task directory.
    pub shard_depth: usize,

    /// Hex digits per shard level.
    pub shard_width: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            raster_root: PathBuf::from("./data/rasters"),
            vector_root: PathBuf::from("./data/vectors"),
            cm_outputs_root: PathBuf::from("./data/cm_outputs"),
            shard_depth: 4,
            shard_width: 2,
        }
    }
}

impl StorageConfig {
    /// Configuration rooted under a single directory, default sharding.
    ///
    /// ```
    /// use cm_orchestrator::config::StorageConfig;
    ///
    /// let config = StorageConfig::rooted_at("/srv/data");
    /// assert!(config.cm_outputs_root.ends_with("cm_outputs"));
    /// ```
    pub fn rooted_at(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            raster_root: root.join("rasters"),
            vector_root: root.join("vectors"),
            cm_outputs_root: root.join("cm_outputs"),
            ..Self::default()
        }
    }

    /// Load configuration from an optional file and the environment.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. TOML configuration file
    /// 3. Default values
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                Self::from_toml(&contents)?
            },
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML content.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        #[derive(Deserialize)]
        struct FullConfig {
            #[serde(default)]
            storage: StorageConfig,
        }

        let full: FullConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        full.storage.validate()?;
        Ok(full.storage)
    }

    /// Apply overrides from a key lookup (the process environment in
    /// [`load`](Self::load)).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("CM_RASTER_CACHE_DIR") {
            self.raster_root = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("CM_VECTOR_CACHE_DIR") {
            self.vector_root = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("CM_OUTPUTS_DIR") {
            self.cm_outputs_root = PathBuf::from(dir);
        }
        if let Some(raw) = lookup("CM_SHARD_DEPTH") {
            match raw.parse() {
                Ok(depth) => self.shard_depth = depth,
                Err(_) => tracing::warn!(value = %raw, "ignoring non-numeric CM_SHARD_DEPTH"),
            }
        }
        if let Some(raw) = lookup("CM_SHARD_WIDTH") {
            match raw.parse() {
                Ok(width) => self.shard_width = width,
                Err(_) => tracing::warn!(value = %raw, "ignoring non-numeric CM_SHARD_WIDTH"),
            }
        }
    }

    /// Check the sharding parameters.
    ///
    /// A UUID carries 32 hex digits, which bounds `shard_depth * shard_width`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shard_depth == 0 || self.shard_width == 0 {
            return Err(ConfigError::Invalid(
                "shard_depth and shard_width must be positive".to_string(),
            ));
        }
        if self.shard_digits() > 32 {
            return Err(ConfigError::Invalid(format!(
                "shard_depth * shard_width = {} x {} exceeds the 32 hex digits of a task id",
                self.shard_depth, self.shard_width
            )));
        }
        Ok(())
    }

    /// Minimum number of hex digits a task id must carry to be sharded.
    pub fn shard_digits(&self) -> usize {
        self.shard_depth.saturating_mul(self.shard_width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_existing_layout() {
        let config = StorageConfig::default();
        assert_eq!(config.shard_depth, 4);
        assert_eq!(config.shard_width, 2);
        assert_eq!(config.shard_digits(), 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn toml_fills_missing_fields_with_defaults() {
        let config = StorageConfig::from_toml(
            r#"
            [storage]
            cm_outputs_root = "/srv/out"
            shard_depth = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.cm_outputs_root, PathBuf::from("/srv/out"));
        assert_eq!(config.shard_depth, 2);
        assert_eq!(config.shard_width, 2);
        assert_eq!(config.raster_root, PathBuf::from("./data/rasters"));
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(StorageConfig::from_toml("").unwrap(), StorageConfig::default());
    }

    #[test]
    fn overrides_win_and_bad_numbers_are_ignored() {
        let env: HashMap<&str, &str> = [
            ("CM_OUTPUTS_DIR", "/tmp/out"),
            ("CM_SHARD_DEPTH", "3"),
            ("CM_SHARD_WIDTH", "two"),
        ]
        .into_iter()
        .collect();

        let mut config = StorageConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.cm_outputs_root, PathBuf::from("/tmp/out"));
        assert_eq!(config.shard_depth, 3);
        assert_eq!(config.shard_width, 2);
    }

    #[test]
    fn oversized_sharding_is_rejected() {
        let config = StorageConfig {
            shard_depth: 17,
            shard_width: 2,
            ..StorageConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = StorageConfig {
            shard_width: 0,
            ..StorageConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        assert!(matches!(
            StorageConfig::from_toml("[storage]\nshard_depth = \"deep\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
