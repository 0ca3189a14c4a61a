//! Integration tests for graph building, execution and the run service
//!
//! These tests drive the public API end to end: in-process execution, the
//! queued service, and a live HTTP server.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;

use stepgraph_rs::demos;
use stepgraph_rs::service::server;
use stepgraph_rs::workflow::graph::{BranchSpec, Route, END};
use stepgraph_rs::workflow::loader::GraphLoader;
use stepgraph_rs::{
    EngineConfig, EngineError, Executor, GraphDefinition, GraphSpec, RunError, RunStatus, Step,
    StepError, StepRegistry, WorkflowService, WorkflowState,
};

// ============================================================================
// Fixtures
// ============================================================================

const BAD_CODE: &str = r#"
def process_data(data):
    for item in data:
        if item > 10:
            print("Complex logic here")
            nested = True
"#;

/// extract -> analyze -> (score >= 10 ? improve -> analyze : END)
static QUALITY_LOOP: Lazy<GraphSpec> = Lazy::new(|| {
    GraphSpec::new("quality-loop")
        .node("extract", "seed_score")
        .node("analyze", "score_code")
        .node("improve", "improve_code")
        .entry("extract")
        .edge("extract", "analyze")
        .conditional(
            "analyze",
            vec![BranchSpec::when("score >= 10", "improve")],
            END,
        )
        .edge("improve", "analyze")
});

fn graph_file(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("graphs")
        .join(name)
}

/// Score starts at 20 and drops by 5 per improve pass when `improve_works`
async fn quality_registry(improve_works: bool) -> StepRegistry {
    let registry = StepRegistry::new();
    registry
        .register_fn("seed_score", |mut s| {
            s.update("baseline", json!(20));
            s.update("passes", json!(0));
            Ok(s)
        })
        .await;
    registry
        .register_fn("score_code", |mut s| {
            let baseline = s.get_f64("baseline").unwrap_or(0.0);
            let passes = s.get_f64("passes").unwrap_or(0.0);
            s.update("score", json!(baseline - 5.0 * (passes + 1.0)));
            Ok(s)
        })
        .await;
    let step: fn(WorkflowState) -> Result<WorkflowState, StepError> = if improve_works {
        |mut s| {
            let passes = s.get_f64("passes").unwrap_or(0.0);
            s.update("passes", json!(passes + 1.0));
            Ok(s)
        }
    } else {
        |s| Ok(s)
    };
    registry.register_fn("improve_code", step).await;
    registry
}

/// Step that parks until released, so tests can act while a run is in flight
struct GateStep {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl Step for GateStep {
    fn name(&self) -> &str {
        "gate"
    }

    async fn run(&self, mut state: WorkflowState) -> Result<WorkflowState, StepError> {
        self.entered.notify_one();
        self.release.notified().await;
        state.update("gated", json!(true));
        Ok(state)
    }
}

async fn demo_service() -> Arc<WorkflowService> {
    let service = WorkflowService::new(demos::registry().await, EngineConfig::default());
    demos::install(&service).await.unwrap();
    Arc::new(service)
}

async fn spawn_server(service: Arc<WorkflowService>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve_on(listener, service));
    format!("http://{}", addr)
}

// ============================================================================
// In-process execution
// ============================================================================

#[tokio::test]
async fn test_quality_loop_completes() {
    let registry = quality_registry(true).await;
    let graph = GraphDefinition::build(&QUALITY_LOOP, &registry).await.unwrap();

    let outcome = Executor::new(10)
        .run(&graph, graph.initial_state(json!(null)))
        .await;

    assert!(outcome.is_completed());
    let state = outcome.state();
    assert_eq!(state.get_f64("score"), Some(5.0));
    assert_eq!(state.logs().len(), 7);
    assert_eq!(state.logs()[6], "Workflow reached END.");
    let analyzed = state
        .logs()
        .iter()
        .filter(|l| l.as_str() == "Executing Node: analyze")
        .count();
    assert_eq!(analyzed, 3);
}

#[tokio::test]
async fn test_stuck_loop_hits_budget() {
    let registry = quality_registry(false).await;
    let graph = GraphDefinition::build(&QUALITY_LOOP, &registry).await.unwrap();

    let outcome = Executor::new(5)
        .run(&graph, graph.initial_state(json!(null)))
        .await;

    assert_eq!(
        outcome.error(),
        Some(&RunError::StepBudgetExceeded { limit: 5 })
    );
    let executed = outcome
        .state()
        .logs()
        .iter()
        .filter(|l| l.starts_with("Executing Node: "))
        .count();
    assert_eq!(executed, 5);
}

#[tokio::test]
async fn test_unknown_step_fails_build() {
    let registry = StepRegistry::new();
    let spec = GraphSpec::new("ghost")
        .node("only", "vanish")
        .entry("only")
        .edge("only", END);

    let err = GraphDefinition::build(&spec, &registry).await.unwrap_err();
    assert!(matches!(err, EngineError::UnknownStepName { ref name } if name == "vanish"));
}

#[tokio::test]
async fn test_routes_record_branch_and_default() {
    let registry = quality_registry(true).await;
    let graph = GraphDefinition::build(&QUALITY_LOOP, &registry).await.unwrap();
    let outcome = Executor::new(10)
        .run(&graph, graph.initial_state(json!(null)))
        .await;

    let routes: Vec<_> = outcome
        .state()
        .routes()
        .iter()
        .map(|d| (d.round, d.to.clone(), d.route.clone()))
        .collect();
    assert_eq!(
        routes,
        vec![
            (
                1,
                "improve".to_string(),
                Route::Branch {
                    index: 0,
                    predicate: "score >= 10".to_string()
                }
            ),
            (
                3,
                "improve".to_string(),
                Route::Branch {
                    index: 0,
                    predicate: "score >= 10".to_string()
                }
            ),
            (5, END.to_string(), Route::Default),
        ]
    );
}

#[tokio::test]
async fn test_graph_files_match_builtin_demos() {
    let loader = GraphLoader::new();
    let review = loader.load_graph(graph_file("code_review.yaml")).unwrap();
    let counter = loader.load_graph(graph_file("counter.json")).unwrap();

    let registry = demos::registry().await;
    let review = GraphDefinition::build(&review, &registry).await.unwrap();
    let counter = GraphDefinition::build(&counter, &registry).await.unwrap();

    let outcome = Executor::new(50)
        .run(&review, review.initial_state(json!(BAD_CODE)))
        .await;
    assert_eq!(outcome.state().get("complexity_score"), Some(&json!(5)));

    let outcome = Executor::new(50)
        .run(&counter, counter.initial_state(json!("Test Run")))
        .await;
    assert_eq!(outcome.state().get("count"), Some(&json!(3)));
}

// ============================================================================
// Service
// ============================================================================

#[tokio::test]
async fn test_submit_returns_before_run_finishes() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let registry = StepRegistry::new();
    registry
        .register(Arc::new(GateStep {
            entered: entered.clone(),
            release: release.clone(),
        }))
        .await;
    let service = WorkflowService::new(registry, EngineConfig::default());
    let graph_id = service
        .create_graph(&GraphSpec::new("gated").node("g", "gate").entry("g").edge("g", END))
        .await
        .unwrap();

    let run_id = service.submit(&graph_id, json!(null), None).await.unwrap();
    entered.notified().await;

    let record = service.get_run(&run_id).await.unwrap();
    assert_eq!(record.status, RunStatus::Running);
    assert!(record.started_at.is_some());
    assert!(record.finished_at.is_none());

    release.notify_one();
    let record = service
        .wait_for(&run_id, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(record.status, RunStatus::Completed);
    assert_eq!(record.state.get("gated"), Some(&json!(true)));
    assert_eq!(record.log(), ["Executing Node: g", "Workflow reached END."]);
}

#[tokio::test]
async fn test_cancel_while_running() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let registry = StepRegistry::new();
    registry
        .register(Arc::new(GateStep {
            entered: entered.clone(),
            release: release.clone(),
        }))
        .await;
    let service = WorkflowService::new(registry, EngineConfig::default());
    let spec = GraphSpec::new("gated-loop")
        .node("g", "gate")
        .entry("g")
        .edge("g", "g");
    let graph_id = service.create_graph(&spec).await.unwrap();

    let run_id = service.submit(&graph_id, json!(null), None).await.unwrap();
    entered.notified().await;
    assert!(service.cancel(&run_id).await.unwrap());
    release.notify_one();

    let record = service
        .wait_for(&run_id, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(record.status, RunStatus::Failed);
    assert_eq!(record.error.as_deref(), Some("Run cancelled"));
    // the in-flight step finished before the cancellation took effect
    assert_eq!(record.state.get("gated"), Some(&json!(true)));
    assert_eq!(record.log(), ["Executing Node: g", "Run cancelled"]);
    assert!(!service.cancel(&run_id).await.unwrap());
}

#[tokio::test]
async fn test_concurrent_runs_are_isolated() {
    let service = demo_service().await;
    let calls = Arc::new(AtomicUsize::new(0));

    let submissions = (0..8).map(|i| {
        let service = service.clone();
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            let code = if i % 2 == 0 {
                BAD_CODE.to_string()
            } else {
                "def ok():\n    return 1\n".to_string()
            };
            let run_id = service
                .submit("demo-review", json!(code), None)
                .await
                .unwrap();
            service
                .wait_for(&run_id, Duration::from_secs(5))
                .await
                .unwrap()
        }
    });
    let records = futures::future::join_all(submissions).await;

    assert_eq!(calls.load(Ordering::SeqCst), 8);
    let mut run_ids: Vec<_> = records.iter().map(|r| r.run_id.clone()).collect();
    run_ids.sort();
    run_ids.dedup();
    assert_eq!(run_ids.len(), 8);

    for (i, record) in records.iter().enumerate() {
        assert_eq!(record.status, RunStatus::Completed);
        let expected_rounds = if i % 2 == 0 { 3 } else { 0 };
        assert_eq!(record.state.get("review_round"), Some(&json!(expected_rounds)));
    }
}

// ============================================================================
// HTTP API
// ============================================================================

async fn poll_state(client: &reqwest::Client, base: &str, run_id: &str) -> Value {
    for _ in 0..500 {
        let body: Value = client
            .get(format!("{}/graph/state/{}", base, run_id))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if body["status"] == "COMPLETED" || body["status"] == "FAILED" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("run {} did not finish", run_id);
}

#[tokio::test]
async fn test_http_demo_review() {
    let base = spawn_server(demo_service().await).await;
    let client = reqwest::Client::new();

    let body: Value = client
        .post(format!("{}/graph/run", base))
        .json(&json!({ "graph_id": "demo-review", "input_data": BAD_CODE }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "submitted");
    let run_id = body["run_id"].as_str().unwrap().to_string();

    let record = poll_state(&client, &base, &run_id).await;
    assert_eq!(record["status"], "COMPLETED");
    assert_eq!(record["graph_id"], "demo-review");
    assert_eq!(record["state"]["data"]["complexity_score"], 5);
    let logs = record["state"]["logs"].as_array().unwrap();
    assert_eq!(logs.last().unwrap(), "Workflow reached END.");
}

#[tokio::test]
async fn test_http_create_and_run_custom_graph() {
    let base = spawn_server(demo_service().await).await;
    let client = reqwest::Client::new();

    let spec = json!({
        "name": "counter-copy",
        "nodes": [
            { "name": "step_1", "tool_name": "start_step" },
            { "name": "step_2", "tool_name": "increment" }
        ],
        "edges": [{ "from_node": "step_1", "to_node": "step_2" }],
        "conditional_edges": [{
            "from_node": "step_2",
            "branches": [{ "when": "count < 5", "to": "step_2" }],
            "default": "END"
        }],
        "entry_point": "step_1"
    });
    let body: Value = client
        .post(format!("{}/graph/create", base))
        .json(&spec)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["message"], "Graph created successfully");
    let graph_id = body["graph_id"].as_str().unwrap().to_string();

    let stored: Value = client
        .get(format!("{}/graph/{}", base, graph_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stored["entry_point"], "step_1");
    assert_eq!(stored["nodes"][1]["step"], "increment");

    let graphs: Value = client
        .get(format!("{}/graphs", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(graphs.as_array().unwrap().len(), 3);

    let body: Value = client
        .post(format!("{}/graph/run", base))
        .json(&json!({ "graph_id": graph_id, "input_data": null, "max_rounds": 3 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let run_id = body["run_id"].as_str().unwrap().to_string();

    let record = poll_state(&client, &base, &run_id).await;
    assert_eq!(record["status"], "FAILED");
    assert_eq!(record["error"], "Step budget of 3 rounds exceeded");
    assert_eq!(record["state"]["data"]["count"], 2);

    let body: Value = client
        .post(format!("{}/graph/cancel/{}", base, run_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({ "run_id": run_id, "cancelled": false }));
}

#[tokio::test]
async fn test_http_rejects_unknown_step() {
    let base = spawn_server(demo_service().await).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/graph/create", base))
        .json(&json!({
            "name": "ghost",
            "nodes": [{ "name": "a", "tool_name": "vanish" }],
            "edges": [{ "from_node": "a", "to_node": "END" }],
            "entry_point": "a"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Step 'vanish' not found in registry");
}
