//! Task registry: a read-through view over the execution engine.
//!
//! The engine owns task state. The registry polls it lazily on every query,
//! maps raw engine outcomes onto the four client-visible statuses through
//! [`normalize_outcome`], and memoizes terminal outcomes so repeated polls
//! after completion return the same status and result even if the engine
//! forgets the job.
//!
//! The memo is bounded: it keeps the [`DEFAULT_SETTLED_CAPACITY`] (or
//! configured) most recently settled tasks and evicts the oldest first. An
//! evicted task is resolved through the engine again on its next poll.
//!
//! ```text
//! engine state        fetched outcome        -> status   result
//! Pending/Started/Retry  -                   -> PENDING  ""
//! Revoked                -                   -> REVOKED  ""
//! Success                Ok(payload)         -> SUCCESS  payload
//! Failure                Err(Raised(msg))    -> FAILURE  msg
//! Success                Err(e)              -> FAILURE  "An unexpected error happened: e"
//! Failure                Err(e), e != Raised -> FAILURE  "An unexpected error happened: e"
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;

use crate::constants::{LEGEND_KEY, UNEXPECTED_ERROR_PREFIX};
use crate::engine::{EngineError, EngineState, ExecutionEngine, JobArgs};
use crate::error::TaskError;
use crate::naming::TaskLayer;
use crate::storage::ArtifactStore;
use crate::types::task::{TaskResult, TaskStatus, TaskView};

/// Normalized status and result of a task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    /// Client-visible status.
    pub status: TaskStatus,
    /// Result slot.
    pub result: TaskResult,
}

impl TaskOutcome {
    fn pending() -> Self {
        Self {
            status: TaskStatus::Pending,
            result: TaskResult::Empty,
        }
    }

    fn revoked() -> Self {
        Self {
            status: TaskStatus::Revoked,
            result: TaskResult::Empty,
        }
    }

    fn failure(message: String) -> Self {
        Self {
            status: TaskStatus::Failure,
            result: TaskResult::Message(message),
        }
    }

    fn unexpected(detail: impl std::fmt::Display) -> Self {
        Self::failure(format!("{UNEXPECTED_ERROR_PREFIX}{detail}"))
    }
}

/// Maps a raw engine state and, for ready jobs, the fetched outcome onto a
/// client-visible outcome.
///
/// Anything that is neither a clean success nor a job that raised is
/// reported as a failure whose message starts with
/// `An unexpected error happened: `.
///
/// # Examples
///
/// ```
/// use cm_orchestrator::engine::{EngineError, EngineState};
/// use cm_orchestrator::registry::normalize_outcome;
/// use cm_orchestrator::{TaskResult, TaskStatus};
///
/// let outcome = normalize_outcome(
///     EngineState::Success,
///     Some(Err(EngineError::Raised { message: "Some problem".into() })),
/// );
/// assert_eq!(outcome.status, TaskStatus::Failure);
/// assert_eq!(
///     outcome.result,
///     TaskResult::Message("An unexpected error happened: Some problem".into())
/// );
/// ```
pub fn normalize_outcome(
    state: EngineState,
    fetched: Option<Result<Value, EngineError>>,
) -> TaskOutcome {
    match (state, fetched) {
        (EngineState::Pending | EngineState::Started | EngineState::Retry, _) => {
            TaskOutcome::pending()
        },
        (EngineState::Revoked, _) => TaskOutcome::revoked(),
        (EngineState::Success, Some(Ok(payload))) => TaskOutcome {
            status: TaskStatus::Success,
            result: TaskResult::Payload(payload),
        },
        (EngineState::Failure, Some(Err(EngineError::Raised { message }))) => {
            TaskOutcome::failure(message)
        },
        (EngineState::Failure, Some(Ok(Value::String(message)))) => TaskOutcome::failure(message),
        (EngineState::Failure, Some(Ok(other))) => TaskOutcome::failure(other.to_string()),
        (EngineState::Success | EngineState::Failure, Some(Err(err))) => {
            TaskOutcome::unexpected(err)
        },
        (EngineState::Success | EngineState::Failure, None) => {
            TaskOutcome::unexpected("no result available")
        },
    }
}

/// Number of terminal outcomes a registry remembers by default.
pub const DEFAULT_SETTLED_CAPACITY: usize = 10_000;

/// Tracks submitted tasks through the execution engine.
pub struct TaskRegistry {
    engine: Arc<dyn ExecutionEngine>,
    store: Arc<ArtifactStore>,
    settled: DashMap<TaskLayer, TaskOutcome>,
    settled_order: Mutex<VecDeque<TaskLayer>>,
    capacity: usize,
}

impl TaskRegistry {
    /// Creates a registry over an engine and the store legends go to.
    pub fn new(engine: Arc<dyn ExecutionEngine>, store: Arc<ArtifactStore>) -> Self {
        Self::with_capacity(engine, store, DEFAULT_SETTLED_CAPACITY)
    }

    /// Creates a registry remembering at most `capacity` terminal outcomes.
    pub fn with_capacity(
        engine: Arc<dyn ExecutionEngine>,
        store: Arc<ArtifactStore>,
        capacity: usize,
    ) -> Self {
        Self {
            engine,
            store,
            settled: DashMap::new(),
            settled_order: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    /// Number of terminal outcomes currently remembered.
    pub fn settled_len(&self) -> usize {
        self.settled.len()
    }

    /// The underlying engine.
    pub fn engine(&self) -> &Arc<dyn ExecutionEngine> {
        &self.engine
    }

    /// Submits a job and returns the layer of its artifacts.
    ///
    /// A job whose engine id cannot name a task directory is terminated
    /// before the error is returned, so it does not keep running unseen.
    pub async fn submit(&self, cm_name: &str, args: JobArgs) -> Result<TaskLayer, TaskError> {
        let task_id = self.engine.submit(cm_name, args).await?;
        let task = match TaskLayer::new(cm_name, task_id.as_str()) {
            Ok(task) => task,
            Err(err) => {
                let reason = format!("engine returned unusable task id: {err}");
                self.abandon(&task_id, &reason).await;
                return Err(TaskError::EngineFault(reason));
            },
        };
        tracing::info!(task = %task, "submitted task");
        Ok(task)
    }

    /// Terminates a submitted job that the caller will never hear about.
    ///
    /// Termination failures are logged; the original error is what the
    /// caller gets.
    pub async fn abandon(&self, task_id: &str, reason: &str) {
        match self.engine.terminate(task_id).await {
            Ok(()) => tracing::warn!(task_id, %reason, "terminated orphaned job"),
            Err(err) => {
                tracing::error!(task_id, %reason, error = %err, "failed to terminate orphaned job");
            },
        }
    }

    /// Current status. Never blocks on completion.
    pub async fn status(&self, task: &TaskLayer) -> Result<TaskStatus, TaskError> {
        Ok(self.outcome(task).await?.status)
    }

    /// Current result: empty while pending or revoked.
    pub async fn result(&self, task: &TaskLayer) -> Result<TaskResult, TaskError> {
        Ok(self.outcome(task).await?.result)
    }

    /// Status and result as one snapshot.
    pub async fn view(&self, task: &TaskLayer) -> Result<TaskView, TaskError> {
        let outcome = self.outcome(task).await?;
        Ok(TaskView::new(task, outcome.status, outcome.result))
    }

    /// Requests cancellation.
    ///
    /// A pending task becomes `REVOKED` immediately, without waiting for the
    /// engine to stop it. A finished or already revoked task is left alone
    /// and its current view is returned.
    pub async fn revoke(&self, task: &TaskLayer) -> Result<TaskView, TaskError> {
        let current = self.outcome(task).await?;
        if !current.status.can_transition_to(&TaskStatus::Revoked) {
            tracing::debug!(task = %task, status = %current.status, "revoke on finished task ignored");
            return Ok(TaskView::new(task, current.status, current.result));
        }

        self.engine.terminate(task.task_id()).await?;
        let outcome = self.settle(task, TaskOutcome::revoked());
        tracing::info!(task = %task, "revoked task");
        Ok(TaskView::new(task, outcome.status, outcome.result))
    }

    /// Resolves the outcome of a task, polling the engine unless a terminal
    /// outcome is already known.
    async fn outcome(&self, task: &TaskLayer) -> Result<TaskOutcome, TaskError> {
        if let Some(settled) = self.settled.get(task) {
            return Ok(settled.value().clone());
        }

        let task_id = task.task_id();
        let state = self.engine.state(task_id).await?;
        let fetched = if state.is_ready() {
            match self.engine.fetch_result(task_id).await {
                Err(EngineError::UnknownJob { task_id }) => {
                    return Err(TaskError::NotFound { task_id });
                },
                fetched => Some(fetched),
            }
        } else {
            None
        };

        let outcome = normalize_outcome(state, fetched);
        if !outcome.status.is_terminal() {
            return Ok(outcome);
        }

        match &outcome.result {
            TaskResult::Payload(payload) => self.persist_legend(task, payload)?,
            TaskResult::Message(message) if message.starts_with(UNEXPECTED_ERROR_PREFIX) => {
                tracing::warn!(task = %task, %message, "engine outcome reclassified as failure");
            },
            _ => {},
        }
        Ok(self.settle(task, outcome))
    }

    fn persist_legend(&self, task: &TaskLayer, payload: &Value) -> Result<(), TaskError> {
        if let Some(legend) = payload.get(LEGEND_KEY).filter(|l| l.is_object()) {
            self.store.write_legend(task, legend).map_err(|err| {
                tracing::error!(task = %task, error = %err, "failed to store legend");
                TaskError::from(err)
            })?;
        }
        Ok(())
    }

    /// Records a terminal outcome. The first recorded outcome wins.
    fn settle(&self, task: &TaskLayer, outcome: TaskOutcome) -> TaskOutcome {
        match self.settled.entry(task.clone()) {
            Entry::Occupied(existing) => return existing.get().clone(),
            Entry::Vacant(slot) => {
                slot.insert(outcome.clone());
            },
        }

        let mut order = self.settled_order.lock();
        order.push_back(task.clone());
        while order.len() > self.capacity {
            if let Some(oldest) = order.pop_front() {
                self.settled.remove(&oldest);
            }
        }
        outcome
    }
}
