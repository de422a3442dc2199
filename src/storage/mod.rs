//! Artifact storage: maps canonical names to on-disk directories.
//!
//! # Layout
//!
//! ```text
//! <raster_root>/<name without kind, percent-encoded>/...   dataset layers (flat)
//! <vector_root>/<name without kind, percent-encoded>/...
//! <cm_outputs_root>/<cm_name>/01/23/45/67/<task_id>/...    task artifacts (sharded)
//! <cm_outputs_root>/.staging/                              upload staging
//! ```
//!
//! Directories are created lazily on first write and never deleted here;
//! retention is an external policy. There is no locking: concurrent writers
//! to the same file follow last-write-wins, and concurrent first writers
//! racing to create a directory both succeed.

pub mod archive;
pub mod shard;
pub mod upload;

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use walkdir::WalkDir;

pub use archive::{Archive, ArchiveAssembler, ArchiveError};
pub use upload::{sanitize_filename, UploadError, UploadIngestor};

use crate::config::StorageConfig;
use crate::constants::{GEOMETRIES_FILE, LEGEND_FILE, STAGING_DIR};
use crate::geo::footprint::Footprints;
use crate::naming::{LayerKind, LayerName, LayerRef, NamingError, TaskLayer};

/// Filesystem-level storage faults.
///
/// Fatal to the calling operation; nothing here retries.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An IO operation on `path` failed (permissions, disk full, missing file).
    #[error("storage IO failed on '{}': {source}", path.display())]
    Io {
        /// The path being accessed.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A filename would resolve outside its layer directory.
    #[error("unsafe filename '{0}'")]
    UnsafeFilename(String),

    /// A stored JSON document could not be encoded or decoded.
    #[error("invalid JSON in '{}': {source}", path.display())]
    Json {
        /// The file being read or written.
        path: PathBuf,
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// The layer name cannot be mapped to a directory.
    #[error(transparent)]
    Naming(#[from] NamingError),
}

impl StorageError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// `true` when the fault is a missing file or directory.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Anything that owns a storage directory.
pub trait StorageKey: fmt::Display {
    /// Absolute directory of this key under the configured roots.
    fn storage_dir(&self, config: &StorageConfig) -> Result<PathBuf, StorageError>;
}

impl StorageKey for LayerName {
    fn storage_dir(&self, config: &StorageConfig) -> Result<PathBuf, StorageError> {
        let root = match self.kind() {
            LayerKind::Raster => &config.raster_root,
            LayerKind::Vector => &config.vector_root,
        };
        Ok(root.join(urlencoding::encode(self.without_kind()).as_ref()))
    }
}

impl StorageKey for TaskLayer {
    fn storage_dir(&self, config: &StorageConfig) -> Result<PathBuf, StorageError> {
        let relative = shard::task_relative_dir(self, config.shard_depth, config.shard_width)?;
        Ok(config.cm_outputs_root.join(relative))
    }
}

impl StorageKey for LayerRef {
    fn storage_dir(&self, config: &StorageConfig) -> Result<PathBuf, StorageError> {
        match self {
            Self::Dataset(name) => name.storage_dir(config),
            Self::Task(task) => task.storage_dir(config),
        }
    }
}

/// Deterministic mapping from layer names to directories and files.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    config: StorageConfig,
}

impl ArtifactStore {
    /// Creates a store over the given roots. Nothing is created on disk.
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    /// The configuration this store was built with.
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Directory of a layer. Pure path computation; does not touch the disk.
    pub fn dir_for(&self, layer: &impl StorageKey) -> Result<PathBuf, StorageError> {
        let dir = layer.storage_dir(&self.config)?;
        tracing::trace!(layer = %layer, dir = %dir.display(), "resolved storage dir");
        Ok(dir)
    }

    /// Path of `filename` inside the layer directory.
    ///
    /// # Errors
    ///
    /// [`StorageError::UnsafeFilename`] unless `filename` is a single plain
    /// path component that does not start with a dot.
    pub fn file_path_for(
        &self,
        layer: &impl StorageKey,
        filename: &str,
    ) -> Result<PathBuf, StorageError> {
        if !is_plain_filename(filename) {
            return Err(StorageError::UnsafeFilename(filename.to_string()));
        }
        Ok(self.dir_for(layer)?.join(filename))
    }

    /// Creates the layer directory if needed. Idempotent.
    pub fn ensure_dir(&self, layer: &impl StorageKey) -> Result<PathBuf, StorageError> {
        let dir = self.dir_for(layer)?;
        std::fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))?;
        Ok(dir)
    }

    /// `true` when the layer directory exists.
    pub fn exists(&self, layer: &impl StorageKey) -> bool {
        self.dir_for(layer).map(|dir| dir.is_dir()).unwrap_or(false)
    }

    /// Writes `bytes` to `filename`, creating the directory first.
    /// An existing file is replaced.
    pub fn write_file(
        &self,
        layer: &impl StorageKey,
        filename: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, StorageError> {
        let path = self.file_path_for(layer, filename)?;
        self.ensure_dir(layer)?;
        std::fs::write(&path, bytes).map_err(|e| StorageError::io(&path, e))?;
        tracing::debug!(layer = %layer, file = filename, bytes = bytes.len(), "stored artifact");
        Ok(path)
    }

    /// Reads `filename` from the layer directory.
    pub fn read_file(&self, layer: &impl StorageKey, filename: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.file_path_for(layer, filename)?;
        std::fs::read(&path).map_err(|e| StorageError::io(&path, e))
    }

    /// Regular files directly under the layer directory, sorted by name.
    ///
    /// Dot-files (in-flight staging artifacts) are skipped.
    pub fn list_files(&self, layer: &impl StorageKey) -> Result<Vec<PathBuf>, StorageError> {
        let dir = self.dir_for(layer)?;
        let mut files = Vec::new();
        for entry in WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(&dir).to_path_buf();
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
                StorageError::Io { path, source }
            })?;
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if entry.file_type().is_file() && !hidden {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }

    /// Serializes `value` as pretty JSON into `filename`.
    pub fn write_json<T: Serialize + ?Sized>(
        &self,
        layer: &impl StorageKey,
        filename: &str,
        value: &T,
    ) -> Result<PathBuf, StorageError> {
        let path = self.file_path_for(layer, filename)?;
        let bytes = serde_json::to_vec_pretty(value).map_err(|source| StorageError::Json {
            path: path.clone(),
            source,
        })?;
        self.write_file(layer, filename, &bytes)
    }

    /// Reads `filename` as JSON, `None` when the file does not exist.
    pub fn read_json<T: DeserializeOwned>(
        &self,
        layer: &impl StorageKey,
        filename: &str,
    ) -> Result<Option<T>, StorageError> {
        let bytes = match self.read_file(layer, filename) {
            Ok(bytes) => bytes,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StorageError::Json {
                path: self.dir_for(layer).unwrap_or_default().join(filename),
                source,
            })
    }

    /// Persists the legend of a successful task.
    pub fn write_legend(&self, task: &TaskLayer, legend: &Value) -> Result<PathBuf, StorageError> {
        self.write_json(task, LEGEND_FILE, legend)
    }

    /// Legend of a task, `None` if the task result carried none.
    pub fn read_legend(&self, task: &TaskLayer) -> Result<Option<Value>, StorageError> {
        self.read_json(task, LEGEND_FILE)
    }

    /// Raster footprints of a dataset layer, `None` when the layer has no
    /// geometry sidecar.
    pub fn read_footprints(&self, layer: &LayerName) -> Result<Option<Footprints>, StorageError> {
        self.read_json(layer, GEOMETRIES_FILE)
    }

    /// Writes the geometry sidecar of a dataset layer.
    pub fn write_footprints(
        &self,
        layer: &LayerName,
        footprints: &Footprints,
    ) -> Result<PathBuf, StorageError> {
        self.write_json(layer, GEOMETRIES_FILE, footprints)
    }

    /// Upload staging directory, created on demand.
    pub fn staging_dir(&self) -> Result<PathBuf, StorageError> {
        let dir = self.config.cm_outputs_root.join(STAGING_DIR);
        std::fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))?;
        Ok(dir)
    }
}

fn is_plain_filename(filename: &str) -> bool {
    if filename.is_empty() || filename.starts_with('.') || filename.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(filename).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
