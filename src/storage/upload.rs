//! Task input uploads.
//!
//! Client-supplied filenames are untrusted. [`sanitize_filename`] reduces
//! them to a single plain filename by stripping (never escaping) anything
//! unsafe, and [`UploadIngestor`] only moves a file into its task directory
//! once its content passed the projection check.

use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::{ArtifactStore, StorageError};
use crate::geo::{GeoEngine, GeoError};
use crate::naming::TaskLayer;

/// Upload rejections and faults.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Sanitization left nothing usable of the raw filename.
    #[error("unsafe upload filename '{0}'")]
    UnsafeName(String),

    /// A raster upload carries no projection.
    #[error("raster '{filename}' has no projection")]
    MissingProjection {
        /// The sanitized filename.
        filename: String,
    },

    /// The store could not resolve or create the target.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The projection could not be read.
    #[error(transparent)]
    Geo(#[from] GeoError),

    /// Staging the upload failed.
    #[error("failed to stage upload at '{}': {source}", path.display())]
    Io {
        /// Staging or destination path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl UploadError {
    /// `true` for rejections caused by the upload itself.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::UnsafeName(_) | Self::MissingProjection { .. })
    }
}

/// Reduces a client-supplied name to a safe plain filename.
///
/// In order: path separators of either convention are removed, characters
/// outside printable ASCII are dropped, leading dots and spaces are trimmed
/// (which also removes `..` prefixes), trailing spaces are trimmed and a
/// `.tiff` extension becomes `.tif`. The function is idempotent.
///
/// Distinct raw names may collapse to the same stored name; the later upload
/// then replaces the earlier one.
///
/// # Errors
///
/// [`UploadError::UnsafeName`] when nothing is left.
///
/// # Examples
///
/// ```
/// use cm_orchestrator::storage::sanitize_filename;
///
/// assert_eq!(sanitize_filename("subfolder/hotmaps.tif").unwrap(), "subfolderhotmaps.tif");
/// assert_eq!(sanitize_filename("../hotmaps.tif").unwrap(), "hotmaps.tif");
/// assert_eq!(sanitize_filename(".hotmaps.tif").unwrap(), "hotmaps.tif");
/// assert_eq!(sanitize_filename("hotmaps\u{2388}.tif").unwrap(), "hotmaps.tif");
/// assert!(sanitize_filename("../..").is_err());
/// ```
pub fn sanitize_filename(raw: &str) -> Result<String, UploadError> {
    let flattened: String = raw
        .chars()
        .filter(|c| !matches!(c, '/' | '\\'))
        .filter(|c| (' '..='~').contains(c))
        .collect();

    let mut name = flattened
        .trim_start_matches(['.', ' '])
        .trim_end_matches(' ')
        .to_string();

    if let Some(stem_len) = name.len().checked_sub(".tiff".len()) {
        if stem_len > 0 && name[stem_len..].eq_ignore_ascii_case(".tiff") {
            name.truncate(stem_len);
            name.push_str(".tif");
        }
    }

    if name.is_empty() {
        return Err(UploadError::UnsafeName(raw.to_string()));
    }
    Ok(name)
}

/// `true` for filenames the projection check applies to.
pub fn is_raster_filename(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("tif") || ext.eq_ignore_ascii_case("tiff"))
}

/// Writes uploaded task inputs into task directories.
pub struct UploadIngestor<'a> {
    store: &'a ArtifactStore,
    geo: &'a dyn GeoEngine,
}

impl<'a> UploadIngestor<'a> {
    /// Creates an ingestor over a store and the engine used to read
    /// projections.
    pub fn new(store: &'a ArtifactStore, geo: &'a dyn GeoEngine) -> Self {
        Self { store, geo }
    }

    /// Stores one uploaded file under the task directory.
    ///
    /// The content is staged outside the task directory first; a raster
    /// without projection is rejected and never reaches the task directory.
    /// An existing file with the same sanitized name is replaced.
    pub fn ingest(
        &self,
        task: &TaskLayer,
        raw_filename: &str,
        content: &[u8],
    ) -> Result<PathBuf, UploadError> {
        let filename = sanitize_filename(raw_filename)?;
        let dest = self.store.file_path_for(task, &filename)?;

        let staging = self.store.staging_dir()?;
        let suffix = Path::new(&filename)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let mut staged = tempfile::Builder::new()
            .prefix(".upload-")
            .suffix(&suffix)
            .tempfile_in(&staging)
            .map_err(|source| UploadError::Io {
                path: staging.clone(),
                source,
            })?;
        staged.write_all(content).map_err(|source| UploadError::Io {
            path: staged.path().to_path_buf(),
            source,
        })?;
        staged.flush().map_err(|source| UploadError::Io {
            path: staged.path().to_path_buf(),
            source,
        })?;

        if is_raster_filename(&filename) && self.geo.raster_crs(staged.path())?.is_none() {
            tracing::warn!(task = %task, file = %filename, "rejected raster upload without projection");
            return Err(UploadError::MissingProjection { filename });
        }

        self.store.ensure_dir(task)?;
        staged.persist(&dest).map_err(|e| UploadError::Io {
            path: dest.clone(),
            source: e.error,
        })?;

        tracing::info!(task = %task, file = %filename, bytes = content.len(), "stored upload");
        Ok(dest)
    }
}
