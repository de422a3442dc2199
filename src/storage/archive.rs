//! Task artifact archives.

use std::io::{Cursor, Write};

use thiserror::Error;

use super::{ArtifactStore, StorageError};
use crate::constants::ARCHIVE_CONTENT_TYPE;
use crate::naming::TaskLayer;

/// Archive assembly failures.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The task has no storage directory.
    #[error("no artifacts stored for '{layer}'")]
    NotFound {
        /// The task layer that was requested.
        layer: String,
    },

    /// Reading the task directory failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The archive could not be encoded.
    #[error("failed to encode archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Writing an entry into the in-memory archive failed.
    #[error("failed to write archive entry '{entry}': {source}")]
    Io {
        /// Entry being written.
        entry: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// A built archive, ready to stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    /// Suggested download name (`<task_id>.zip`).
    pub filename: String,
    /// MIME type of `bytes`.
    pub content_type: &'static str,
    /// The encoded archive.
    pub bytes: Vec<u8>,
}

/// Bundles the files of a task directory into one zip archive.
pub struct ArchiveAssembler<'a> {
    store: &'a ArtifactStore,
}

impl<'a> ArchiveAssembler<'a> {
    /// Creates an assembler reading from `store`.
    pub fn new(store: &'a ArtifactStore) -> Self {
        Self { store }
    }

    /// Cheap probe: whether the task directory exists.
    pub fn exists(&self, task: &TaskLayer) -> bool {
        self.store.exists(task)
    }

    /// Builds the archive of every file directly under the task directory.
    ///
    /// Entries carry the stored filename and the exact stored bytes. Files
    /// are read from the walked paths, so engine-written names an upload
    /// could never produce, such as ones holding a backslash, are archived
    /// as-is. Names that are not valid UTF-8 are skipped with a warning.
    ///
    /// # Errors
    ///
    /// [`ArchiveError::NotFound`] when the task directory does not exist;
    /// an empty directory yields an empty archive. A task id too short to
    /// shard is a [`StorageError::Naming`] fault.
    pub fn build(&self, task: &TaskLayer) -> Result<Archive, ArchiveError> {
        if !self.store.dir_for(task)?.is_dir() {
            return Err(ArchiveError::NotFound {
                layer: task.to_string(),
            });
        }

        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        let mut entries = 0usize;
        for path in self.store.list_files(task)? {
            let Some(entry) = path.file_name().and_then(|name| name.to_str()) else {
                tracing::warn!(task = %task, path = %path.display(), "skipping artifact with non UTF-8 name");
                continue;
            };
            let bytes = std::fs::read(&path).map_err(|e| StorageError::io(&path, e))?;

            zip.start_file(entry, options)?;
            zip.write_all(&bytes).map_err(|source| ArchiveError::Io {
                entry: entry.to_string(),
                source,
            })?;
            entries += 1;
        }

        let bytes = zip.finish()?.into_inner();
        tracing::info!(task = %task, entries, bytes = bytes.len(), "built archive");

        Ok(Archive {
            filename: format!("{}.zip", task.task_id()),
            content_type: ARCHIVE_CONTENT_TYPE,
            bytes,
        })
    }
}
