//! Error types for task operations.
//!
//! Provides [`TaskError`], the error returned by every operation of
//! [`CmService`](crate::service::CmService), classified by [`ErrorKind`] and
//! mapped to the HTTP status the routing layer should answer with.

use std::fmt;

use crate::engine::EngineError;
use crate::geo::{SelectionError, SelectionReport};
use crate::naming::NamingError;
use crate::storage::{ArchiveError, StorageError, UploadError};

/// Coarse classification of a [`TaskError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request itself is unusable (missing keys, bad names).
    MalformedInput,
    /// The request was understood but the selection failed the coverage check.
    ValidationRejected,
    /// An upload was refused before anything was stored.
    UploadRejected,
    /// A filesystem operation failed.
    StorageFault,
    /// The execution engine or the geospatial backend failed.
    EngineFault,
    /// The task, module or layer does not exist.
    NotFound,
}

/// Errors that can occur during task operations.
///
/// # Examples
///
/// ```
/// use cm_orchestrator::{ErrorKind, TaskError};
///
/// let err = TaskError::NotFound {
///     task_id: "01234567".to_string(),
/// };
/// assert_eq!(err.kind(), ErrorKind::NotFound);
/// assert_eq!(err.http_status(), 404);
/// assert!(err.to_string().contains("01234567"));
/// ```
#[derive(Debug)]
pub enum TaskError {
    /// No calculation module with this name.
    UnknownCm {
        /// The requested module name.
        cm_name: String,
    },

    /// The engine has no task with this id.
    NotFound {
        /// The requested task id.
        task_id: String,
    },

    /// The target layer has no data to run on.
    LayerNotFound {
        /// The requested layer name.
        layer: String,
    },

    /// The request is malformed.
    MalformedInput {
        /// What is wrong with it.
        reason: String,
    },

    /// The selection failed the coverage check.
    ValidationRejected {
        /// The full report, to surface to the client.
        report: SelectionReport,
    },

    /// The upload was refused.
    UploadRejected {
        /// Why.
        reason: String,
    },

    /// A filesystem operation failed.
    StorageFault(String),

    /// The execution engine failed outside of a task outcome.
    EngineFault(String),

    /// The geospatial backend could not compute the coverage check.
    ComputationFault(String),
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownCm { cm_name } => write!(f, "calculation module not found: {cm_name}"),
            Self::NotFound { task_id } => write!(f, "task not found: {task_id}"),
            Self::LayerNotFound { layer } => write!(f, "layer has no data: {layer}"),
            Self::MalformedInput { reason } => write!(f, "malformed request: {reason}"),
            Self::ValidationRejected { report } => {
                write!(f, "selection rejected (count: {})", report.count)?;
                for key in report.values.keys() {
                    write!(f, " {key}")?;
                }
                Ok(())
            },
            Self::UploadRejected { reason } => write!(f, "upload rejected: {reason}"),
            Self::StorageFault(msg) => write!(f, "storage error: {msg}"),
            Self::EngineFault(msg) => write!(f, "engine error: {msg}"),
            Self::ComputationFault(msg) => write!(f, "computation error: {msg}"),
        }
    }
}

impl std::error::Error for TaskError {}

impl TaskError {
    /// Classifies this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedInput { .. } => ErrorKind::MalformedInput,
            Self::ValidationRejected { .. } => ErrorKind::ValidationRejected,
            Self::UploadRejected { .. } => ErrorKind::UploadRejected,
            Self::StorageFault(_) => ErrorKind::StorageFault,
            Self::EngineFault(_) | Self::ComputationFault(_) => ErrorKind::EngineFault,
            Self::UnknownCm { .. } | Self::NotFound { .. } | Self::LayerNotFound { .. } => {
                ErrorKind::NotFound
            },
        }
    }

    /// HTTP status the routing layer should answer with.
    ///
    /// - `400`: `MalformedInput`, `UploadRejected`
    /// - `404`: `NotFound`
    /// - `422`: `ValidationRejected`
    /// - `500`: `StorageFault`, `EngineFault`
    pub fn http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::MalformedInput | ErrorKind::UploadRejected => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::ValidationRejected => 422,
            ErrorKind::StorageFault | ErrorKind::EngineFault => 500,
        }
    }

    /// `true` for conditions the caller caused and can fix.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::MalformedInput | ErrorKind::ValidationRejected | ErrorKind::UploadRejected
        )
    }
}

impl From<NamingError> for TaskError {
    fn from(err: NamingError) -> Self {
        Self::MalformedInput {
            reason: err.to_string(),
        }
    }
}

impl From<StorageError> for TaskError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Naming(naming @ NamingError::InvalidSharding { .. }) => {
                Self::StorageFault(naming.to_string())
            },
            StorageError::Naming(naming) => naming.into(),
            other => Self::StorageFault(other.to_string()),
        }
    }
}

impl From<SelectionError> for TaskError {
    fn from(err: SelectionError) -> Self {
        if err.is_malformed_input() {
            Self::MalformedInput {
                reason: err.to_string(),
            }
        } else {
            Self::ComputationFault(err.to_string())
        }
    }
}

impl From<UploadError> for TaskError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::Storage(storage) => storage.into(),
            other if other.is_rejection() => Self::UploadRejected {
                reason: other.to_string(),
            },
            other => Self::StorageFault(other.to_string()),
        }
    }
}

impl From<ArchiveError> for TaskError {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::NotFound { layer } => Self::NotFound { task_id: layer },
            ArchiveError::Storage(storage) => storage.into(),
            other => Self::StorageFault(other.to_string()),
        }
    }
}

impl From<EngineError> for TaskError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::UnknownJob { task_id } => Self::NotFound { task_id },
            other => Self::EngineFault(other.to_string()),
        }
    }
}
