//! Task registry lifecycle over the in-memory engine.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use cm_orchestrator::engine::{EngineError, EngineState, ExecutionEngine, InMemoryEngine, JobArgs};
use cm_orchestrator::naming::TaskLayer;
use cm_orchestrator::registry::TaskRegistry;
use cm_orchestrator::storage::ArtifactStore;
use cm_orchestrator::{ErrorKind, TaskResult, TaskStatus};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use common::{temp_store, TASK_ID};

fn job_args() -> JobArgs {
    JobArgs {
        selection: json!({"features": []}),
        rasters: vec!["/data/rasters/42/FID1.tif".to_string()],
        parameters: json!({"param1": 4}),
    }
}

struct Fixture {
    _root: tempfile::TempDir,
    engine: Arc<InMemoryEngine>,
    store: Arc<ArtifactStore>,
    registry: TaskRegistry,
    task: TaskLayer,
}

fn fixture() -> Fixture {
    let (root, store) = temp_store();
    let store = Arc::new(store);
    let engine = Arc::new(InMemoryEngine::new());
    engine.insert(TASK_ID, "mock_cm", job_args());
    let registry = TaskRegistry::new(engine.clone(), Arc::clone(&store));
    Fixture {
        _root: root,
        engine,
        store,
        registry,
        task: TaskLayer::new("mock_cm", TASK_ID).unwrap(),
    }
}

#[tokio::test]
async fn fresh_task_is_pending_with_empty_result() {
    let f = fixture();
    let view = f.registry.view(&f.task).await.unwrap();
    assert_eq!(view.status, TaskStatus::Pending);
    assert_eq!(view.result, TaskResult::Empty);
    assert_eq!(
        serde_json::to_value(&view).unwrap(),
        json!({
            "cm_name": "mock_cm",
            "task_id": TASK_ID,
            "status": "PENDING",
            "result": ""
        })
    );
}

#[tokio::test]
async fn started_and_retried_tasks_are_still_pending() {
    let f = fixture();
    for state in [EngineState::Started, EngineState::Retry] {
        f.engine.set_state(TASK_ID, state);
        assert_eq!(f.registry.status(&f.task).await.unwrap(), TaskStatus::Pending);
    }
}

#[tokio::test]
async fn success_without_legend_stores_no_legend() {
    let f = fixture();
    f.engine.complete(TASK_ID, json!({"value1": 10, "value2": 20}));

    let view = f.registry.view(&f.task).await.unwrap();
    assert_eq!(view.status, TaskStatus::Success);
    assert_eq!(
        serde_json::to_value(&view).unwrap()["result"],
        json!({"value1": 10, "value2": 20})
    );
    assert_eq!(f.store.read_legend(&f.task).unwrap(), None);
}

#[tokio::test]
async fn success_with_legend_persists_it() {
    let f = fixture();
    let payload = json!({"value1": 10, "value2": 20, "legend": {"symbology": []}});
    f.engine.complete(TASK_ID, payload.clone());

    let result = f.registry.result(&f.task).await.unwrap();
    assert_eq!(result, TaskResult::Payload(payload));
    assert_eq!(
        f.store.read_legend(&f.task).unwrap(),
        Some(json!({"symbology": []}))
    );
}

#[tokio::test]
async fn raised_failure_surfaces_its_message() {
    let f = fixture();
    f.engine.fail(TASK_ID, "Some problem");

    let view = f.registry.view(&f.task).await.unwrap();
    assert_eq!(view.status, TaskStatus::Failure);
    assert_eq!(view.result, TaskResult::Message("Some problem".into()));
}

#[tokio::test]
async fn success_whose_result_raises_is_an_unexpected_failure() {
    let f = fixture();
    f.engine.break_result(TASK_ID, "Some problem");

    let view = f.registry.view(&f.task).await.unwrap();
    assert_eq!(view.status, TaskStatus::Failure);
    assert_eq!(
        serde_json::to_value(&view).unwrap()["result"],
        json!("An unexpected error happened: Some problem")
    );
}

#[tokio::test]
async fn terminal_outcome_is_stable_across_polls() {
    let f = fixture();
    f.engine.complete(TASK_ID, json!({"value": 1}));
    let first = f.registry.view(&f.task).await.unwrap();

    // The engine forgetting or rewriting the job must not change what
    // clients already observed.
    f.engine.set_state(TASK_ID, EngineState::Pending);
    let second = f.registry.view(&f.task).await.unwrap();
    f.engine.fail(TASK_ID, "late failure");
    let third = f.registry.view(&f.task).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(second, third);
}

#[tokio::test]
async fn revoke_pending_task_yields_revoked_with_empty_result() {
    let f = fixture();
    let view = f.registry.revoke(&f.task).await.unwrap();
    assert_eq!(view.status, TaskStatus::Revoked);
    assert_eq!(view.result, TaskResult::Empty);
    assert_eq!(f.engine.terminate_requests(TASK_ID), 1);

    assert_eq!(f.registry.status(&f.task).await.unwrap(), TaskStatus::Revoked);
}

#[tokio::test]
async fn revoke_is_idempotent() {
    let f = fixture();
    f.registry.revoke(&f.task).await.unwrap();
    let again = f.registry.revoke(&f.task).await.unwrap();
    assert_eq!(again.status, TaskStatus::Revoked);
    assert_eq!(f.engine.terminate_requests(TASK_ID), 1);
}

#[tokio::test]
async fn revoke_finished_task_is_a_no_op() {
    let f = fixture();
    f.engine.complete(TASK_ID, json!({"value": 1}));

    let view = f.registry.revoke(&f.task).await.unwrap();
    assert_eq!(view.status, TaskStatus::Success);
    assert_eq!(view.result, TaskResult::Payload(json!({"value": 1})));
    assert_eq!(f.engine.terminate_requests(TASK_ID), 0);
}

#[tokio::test]
async fn task_revoked_engine_side_reads_as_revoked() {
    let f = fixture();
    f.engine.set_state(TASK_ID, EngineState::Revoked);
    let view = f.registry.view(&f.task).await.unwrap();
    assert_eq!(view.status, TaskStatus::Revoked);
    assert_eq!(view.result, TaskResult::Empty);
}

#[tokio::test]
async fn unknown_task_is_not_found() {
    let f = fixture();
    let unknown = TaskLayer::new("mock_cm", "89abcdef-0000-0000-0000-000000000000").unwrap();

    let err = f.registry.view(&unknown).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.http_status(), 404);

    let err = f.registry.revoke(&unknown).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn submit_returns_task_layer_of_engine_id() {
    let f = fixture();
    let task = f.registry.submit("mock_cm", job_args()).await.unwrap();
    assert_eq!(task.cm_name(), "mock_cm");
    let (cm, args) = f.engine.submitted(task.task_id()).unwrap();
    assert_eq!(cm, "mock_cm");
    assert_eq!(args, job_args());
}

#[tokio::test]
async fn settled_outcomes_are_bounded() {
    let (_root, store) = temp_store();
    let engine = Arc::new(InMemoryEngine::new());
    let registry = TaskRegistry::with_capacity(engine.clone(), Arc::new(store), 2);

    let ids = [
        "00000000-0000-0000-0000-000000000001",
        "00000000-0000-0000-0000-000000000002",
        "00000000-0000-0000-0000-000000000003",
    ];
    for id in ids {
        engine.insert(id, "mock_cm", job_args());
        engine.complete(id, json!({"id": id}));
        let task = TaskLayer::new("mock_cm", id).unwrap();
        assert_eq!(registry.status(&task).await.unwrap(), TaskStatus::Success);
        assert!(registry.settled_len() <= 2);
    }
    assert_eq!(registry.settled_len(), 2);

    // The oldest entry was evicted, so its next poll goes back to the engine.
    engine.fail(ids[0], "rewritten");
    let oldest = TaskLayer::new("mock_cm", ids[0]).unwrap();
    assert_eq!(registry.status(&oldest).await.unwrap(), TaskStatus::Failure);

    // The most recent ones are still memoized.
    engine.fail(ids[2], "rewritten");
    let newest = TaskLayer::new("mock_cm", ids[2]).unwrap();
    assert_eq!(registry.status(&newest).await.unwrap(), TaskStatus::Success);
    assert_eq!(registry.settled_len(), 2);
}

/// Engine handing out ids that cannot name a task directory.
struct OpaqueIdEngine {
    inner: InMemoryEngine,
}

#[async_trait]
impl ExecutionEngine for OpaqueIdEngine {
    async fn submit(&self, cm_name: &str, args: JobArgs) -> Result<String, EngineError> {
        self.inner.insert("job:42", cm_name, args);
        Ok("job:42".to_string())
    }

    async fn state(&self, task_id: &str) -> Result<EngineState, EngineError> {
        self.inner.state(task_id).await
    }

    async fn fetch_result(&self, task_id: &str) -> Result<Value, EngineError> {
        self.inner.fetch_result(task_id).await
    }

    async fn terminate(&self, task_id: &str) -> Result<(), EngineError> {
        self.inner.terminate(task_id).await
    }
}

#[tokio::test]
async fn job_with_unusable_id_is_terminated() {
    let (_root, store) = temp_store();
    let engine = Arc::new(OpaqueIdEngine {
        inner: InMemoryEngine::new(),
    });
    let registry = TaskRegistry::new(engine.clone(), Arc::new(store));

    let err = registry.submit("mock_cm", job_args()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EngineFault);
    assert_eq!(engine.inner.terminate_requests("job:42"), 1);
    assert_eq!(
        engine.inner.state("job:42").await.unwrap(),
        EngineState::Revoked
    );
}
