//! Execution engine capability.
//!
//! The engine actually runs calculation module code out of process. This
//! crate only needs four operations from it, captured by
//! [`ExecutionEngine`]: submit a job, poll its raw state, fetch its
//! outcome once ready, and request termination.
//!
//! Engine states are engine-specific and richer than the four task statuses
//! clients see; the mapping lives in
//! [`normalize_outcome`](crate::registry::normalize_outcome).
//!
//! [`memory::InMemoryEngine`] is an in-process implementation for tests and
//! local runs.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use memory::InMemoryEngine;

/// Arguments of one calculation module invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobArgs {
    /// The client selection, forwarded verbatim.
    pub selection: Value,
    /// Absolute paths of the rasters the module should read.
    pub rasters: Vec<String>,
    /// Module parameters, forwarded verbatim.
    pub parameters: Value,
}

/// Raw engine-side state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineState {
    /// Queued or unknown to the workers yet.
    Pending,
    /// Picked up by a worker.
    Started,
    /// Failed once, scheduled again.
    Retry,
    /// Returned normally.
    Success,
    /// Raised.
    Failure,
    /// Terminated on request.
    Revoked,
}

impl EngineState {
    /// `true` once an outcome can be fetched.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }
}

/// Errors surfaced by an engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The engine has no record of this job.
    #[error("unknown job '{task_id}'")]
    UnknownJob {
        /// The job id that was looked up.
        task_id: String,
    },

    /// The job raised; `message` is the raised error text.
    #[error("{message}")]
    Raised {
        /// Text of the raised error.
        message: String,
    },

    /// The engine itself failed (broker down, result backend unreadable).
    #[error("engine backend error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },
}

/// Job submission, polling and termination.
///
/// Implementations must be cheap to poll: callers re-poll to observe
/// completion and never block on it.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Submits a job and returns its engine-assigned id.
    async fn submit(&self, cm_name: &str, args: JobArgs) -> Result<String, EngineError>;

    /// Current raw state of a job.
    async fn state(&self, task_id: &str) -> Result<EngineState, EngineError>;

    /// Outcome of a ready job: the payload when it returned, or
    /// [`EngineError::Raised`] when it raised.
    async fn fetch_result(&self, task_id: &str) -> Result<Value, EngineError>;

    /// Requests termination. Returns without waiting for the job to stop.
    async fn terminate(&self, task_id: &str) -> Result<(), EngineError>;
}
