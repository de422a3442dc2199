//! In-process execution engine.
//!
//! [`InMemoryEngine`] keeps job records in a [`DashMap`] and never runs
//! anything: tests drive outcomes through [`complete`](InMemoryEngine::complete),
//! [`fail`](InMemoryEngine::fail) and friends.
//!
//! # Examples
//!
//! ```
//! # tokio_test_block(async {
//! use cm_orchestrator::engine::{EngineState, ExecutionEngine, InMemoryEngine, JobArgs};
//! use serde_json::json;
//!
//! let engine = InMemoryEngine::new();
//! let args = JobArgs { selection: json!({}), rasters: vec![], parameters: json!({}) };
//! let id = engine.submit("mock_cm", args).await.unwrap();
//! assert_eq!(engine.state(&id).await.unwrap(), EngineState::Pending);
//!
//! engine.complete(&id, json!({"value": 1}));
//! assert_eq!(engine.fetch_result(&id).await.unwrap(), json!({"value": 1}));
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use super::{EngineError, EngineState, ExecutionEngine, JobArgs};

#[derive(Debug, Clone)]
struct JobRecord {
    cm_name: String,
    args: JobArgs,
    state: EngineState,
    outcome: Option<Result<Value, EngineError>>,
    terminate_requests: usize,
}

/// Thread-safe in-process engine.
#[derive(Debug, Default)]
pub struct InMemoryEngine {
    jobs: DashMap<String, JobRecord>,
}

impl InMemoryEngine {
    /// Creates an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a job under a fixed id, as if it had been submitted.
    pub fn insert(&self, task_id: impl Into<String>, cm_name: impl Into<String>, args: JobArgs) {
        self.jobs.insert(
            task_id.into(),
            JobRecord {
                cm_name: cm_name.into(),
                args,
                state: EngineState::Pending,
                outcome: None,
                terminate_requests: 0,
            },
        );
    }

    /// Marks a job as returned with `payload`.
    pub fn complete(&self, task_id: &str, payload: Value) {
        self.settle(task_id, EngineState::Success, Ok(payload));
    }

    /// Marks a job as raised with `message`.
    pub fn fail(&self, task_id: &str, message: impl Into<String>) {
        self.settle(
            task_id,
            EngineState::Failure,
            Err(EngineError::Raised {
                message: message.into(),
            }),
        );
    }

    /// Marks a job as successful but makes fetching its result raise.
    pub fn break_result(&self, task_id: &str, message: impl Into<String>) {
        self.settle(
            task_id,
            EngineState::Success,
            Err(EngineError::Raised {
                message: message.into(),
            }),
        );
    }

    /// Forces the raw state without touching the outcome.
    pub fn set_state(&self, task_id: &str, state: EngineState) {
        if let Some(mut job) = self.jobs.get_mut(task_id) {
            job.state = state;
        }
    }

    /// Module name and arguments a job was submitted with.
    pub fn submitted(&self, task_id: &str) -> Option<(String, JobArgs)> {
        self.jobs
            .get(task_id)
            .map(|job| (job.cm_name.clone(), job.args.clone()))
    }

    /// How many times termination was requested for a job.
    pub fn terminate_requests(&self, task_id: &str) -> usize {
        self.jobs
            .get(task_id)
            .map(|job| job.terminate_requests)
            .unwrap_or(0)
    }

    /// Ids of every known job, sorted.
    pub fn job_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.jobs.iter().map(|job| job.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Number of known jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// `true` when no job was submitted.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    fn settle(&self, task_id: &str, state: EngineState, outcome: Result<Value, EngineError>) {
        if let Some(mut job) = self.jobs.get_mut(task_id) {
            job.state = state;
            job.outcome = Some(outcome);
        }
    }

    fn unknown(task_id: &str) -> EngineError {
        EngineError::UnknownJob {
            task_id: task_id.to_string(),
        }
    }
}

#[async_trait]
impl ExecutionEngine for InMemoryEngine {
    async fn submit(&self, cm_name: &str, args: JobArgs) -> Result<String, EngineError> {
        let task_id = uuid::Uuid::new_v4().to_string();
        self.insert(task_id.clone(), cm_name, args);
        Ok(task_id)
    }

    async fn state(&self, task_id: &str) -> Result<EngineState, EngineError> {
        self.jobs
            .get(task_id)
            .map(|job| job.state)
            .ok_or_else(|| Self::unknown(task_id))
    }

    async fn fetch_result(&self, task_id: &str) -> Result<Value, EngineError> {
        let job = self.jobs.get(task_id).ok_or_else(|| Self::unknown(task_id))?;
        match &job.outcome {
            Some(outcome) => outcome.clone(),
            None => Err(EngineError::Backend {
                message: format!("job '{task_id}' is {:?}, no outcome yet", job.state),
            }),
        }
    }

    async fn terminate(&self, task_id: &str) -> Result<(), EngineError> {
        let mut job = self
            .jobs
            .get_mut(task_id)
            .ok_or_else(|| Self::unknown(task_id))?;
        job.terminate_requests += 1;
        if !job.state.is_ready() {
            job.state = EngineState::Revoked;
        }
        Ok(())
    }
}
