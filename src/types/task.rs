//! Task wire types.
//!
//! [`TaskStatus`] and [`TaskView`] are what the HTTP layer returns for task
//! queries. `status` serializes in upper case (`PENDING`, `SUCCESS`, ...) and
//! an empty `result` serializes as `""`.

use std::fmt;

use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::naming::TaskLayer;

/// Task lifecycle status.
///
/// # State Machine
///
/// ```text
/// Pending -> Success, Failure, Revoked
/// Success -> (terminal, no transitions)
/// Failure -> (terminal, no transitions)
/// Revoked -> (terminal, no transitions)
/// ```
///
/// # Examples
///
/// ```
/// use cm_orchestrator::TaskStatus;
///
/// assert!(!TaskStatus::Pending.is_terminal());
/// assert!(TaskStatus::Pending.can_transition_to(&TaskStatus::Revoked));
/// assert!(!TaskStatus::Success.can_transition_to(&TaskStatus::Revoked));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Submitted, not finished yet.
    Pending,
    /// Finished with a payload (terminal).
    Success,
    /// Finished with an error (terminal).
    Failure,
    /// Cancelled by a caller (terminal).
    Revoked,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Success => write!(f, "SUCCESS"),
            Self::Failure => write!(f, "FAILURE"),
            Self::Revoked => write!(f, "REVOKED"),
        }
    }
}

impl TaskStatus {
    /// Returns `true` for `Success`, `Failure` and `Revoked`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Returns `true` if moving from this status to `next` is valid.
    ///
    /// Only `Pending` moves, and never to itself.
    pub fn can_transition_to(&self, next: &Self) -> bool {
        matches!(self, Self::Pending) && next.is_terminal()
    }
}

/// Result slot of a task.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TaskResult {
    /// No result yet (pending) or none will come (revoked).
    #[default]
    Empty,
    /// Payload of a successful task, verbatim.
    Payload(Value),
    /// Failure description.
    Message(String),
}

impl TaskResult {
    /// `true` for [`TaskResult::Empty`].
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// The success payload, if any.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Self::Payload(value) => Some(value),
            _ => None,
        }
    }

    /// The failure message, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Message(message) => Some(message),
            _ => None,
        }
    }
}

impl Serialize for TaskResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Empty => serializer.serialize_str(""),
            Self::Payload(value) => value.serialize(serializer),
            Self::Message(message) => serializer.serialize_str(message),
        }
    }
}

/// A task status snapshot as returned to clients.
///
/// # Examples
///
/// ```
/// use cm_orchestrator::{TaskResult, TaskStatus, TaskView};
/// use serde_json::json;
///
/// let view = TaskView {
///     cm_name: "mock_cm".to_string(),
///     task_id: "01234567".to_string(),
///     status: TaskStatus::Pending,
///     result: TaskResult::Empty,
/// };
/// assert_eq!(
///     serde_json::to_value(&view).unwrap(),
///     json!({"cm_name": "mock_cm", "task_id": "01234567", "status": "PENDING", "result": ""})
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskView {
    /// Owning calculation module.
    pub cm_name: String,
    /// Engine-assigned id.
    pub task_id: String,
    /// Normalized status.
    pub status: TaskStatus,
    /// Result slot.
    pub result: TaskResult,
}

impl TaskView {
    /// Builds a view for a task layer.
    pub fn new(task: &TaskLayer, status: TaskStatus, result: TaskResult) -> Self {
        Self {
            cm_name: task.cm_name().to_string(),
            task_id: task.task_id().to_string(),
            status,
            result,
        }
    }
}
