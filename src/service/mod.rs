// SPDX-License-Identifier: MIT

//! Graph/run service
//!
//! Ties the registry, the graph and run stores and the worker pool
//! together behind one facade used by the HTTP server and the CLI.

pub mod server;
pub mod store;
pub mod worker;

use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

use crate::config::{validate_max_rounds, EngineConfig};
use crate::engine::error::EngineError;
use crate::workflow::graph::{GraphDefinition, GraphSpec};
use crate::workflow::registry::StepRegistry;
use crate::workflow::run::RunRecord;
use store::{GraphStore, GraphSummary, RunStore};
use worker::{RunJob, WorkerPool};

/// High-level entry point for creating graphs and submitting runs
pub struct WorkflowService {
    registry: StepRegistry,
    graphs: GraphStore,
    runs: RunStore,
    pool: WorkerPool,
    config: EngineConfig,
}

impl WorkflowService {
    /// Create the service and start its worker pool
    pub fn new(registry: StepRegistry, config: EngineConfig) -> Self {
        let runs = RunStore::new();
        let pool = WorkerPool::start(config.workers, runs.clone());
        Self {
            registry,
            graphs: GraphStore::new(),
            runs,
            pool,
            config,
        }
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Build and store a graph under a fresh id
    pub async fn create_graph(&self, spec: &GraphSpec) -> Result<String, EngineError> {
        let graph_id = Uuid::new_v4().to_string();
        self.insert_graph(&graph_id, spec).await?;
        Ok(graph_id)
    }

    /// Build and store a graph under a caller-chosen id
    pub async fn insert_graph(&self, graph_id: &str, spec: &GraphSpec) -> Result<(), EngineError> {
        let graph = GraphDefinition::build(spec, &self.registry).await?;
        self.graphs.insert(graph_id, graph).await;
        log::info!("Stored graph '{}' as {}", spec.name, graph_id);
        Ok(())
    }

    /// Queue a run and return its id without waiting for it to execute
    pub async fn submit(
        &self,
        graph_id: &str,
        input: Value,
        max_rounds: Option<u32>,
    ) -> Result<String, EngineError> {
        let graph = self.graphs.get(graph_id).await?;
        let max_rounds = validate_max_rounds(
            max_rounds.unwrap_or(self.config.max_rounds),
            self.config.max_rounds_limit,
        )?;

        let state = graph.initial_state(input);
        let record = RunRecord::pending(graph_id, state.clone());
        let run_id = record.run_id.clone();
        let cancel = self.runs.insert(record).await;

        let job = RunJob {
            run_id: run_id.clone(),
            graph,
            state,
            max_rounds,
            cancel,
        };
        if let Err(e) = self.pool.submit(job) {
            self.runs.remove(&run_id).await;
            return Err(e);
        }
        log::info!("Submitted run {} for graph {}", run_id, graph_id);
        Ok(run_id)
    }

    /// Snapshot of a run record
    pub async fn get_run(&self, run_id: &str) -> Result<RunRecord, EngineError> {
        self.runs.get(run_id).await
    }

    /// Poll until the run is terminal or `timeout` elapses; returns the last snapshot
    pub async fn wait_for(&self, run_id: &str, timeout: Duration) -> Result<RunRecord, EngineError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let record = self.runs.get(run_id).await?;
            if record.status.is_terminal() || tokio::time::Instant::now() >= deadline {
                return Ok(record);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Request cooperative cancellation of a run
    pub async fn cancel(&self, run_id: &str) -> Result<bool, EngineError> {
        self.runs.cancel(run_id).await
    }

    pub async fn list_graphs(&self) -> Vec<GraphSummary> {
        self.graphs.list().await
    }

    /// Declarative form of a stored graph
    pub async fn graph_spec(&self, graph_id: &str) -> Result<GraphSpec, EngineError> {
        Ok(self.graphs.get(graph_id).await?.to_spec())
    }

    /// Stop accepting runs and wait for queued ones to finish
    pub async fn shutdown(self) {
        self.pool.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::error::StepError;
    use crate::workflow::graph::{BranchSpec, END};
    use crate::workflow::run::RunStatus;
    use serde_json::json;

    async fn service() -> WorkflowService {
        let registry = StepRegistry::new();
        registry
            .register_fn("start_step", |mut s| {
                s.update("count", json!(0));
                Ok(s)
            })
            .await;
        registry
            .register_fn("increment", |mut s| {
                let count = s.get_f64("count").ok_or(StepError::MissingField("count".into()))?;
                s.update("count", json!(count + 1.0));
                Ok(s)
            })
            .await;
        registry
            .register_fn("explode", |_| Err(StepError::failed("kaboom")))
            .await;
        registry
            .register_fn("panic", |_| panic!("step bug"))
            .await;
        WorkflowService::new(registry, EngineConfig::default().with_workers(2))
    }

    fn counter_spec() -> GraphSpec {
        GraphSpec::new("counter")
            .node("step_1", "start_step")
            .node("step_2", "increment")
            .entry("step_1")
            .edge("step_1", "step_2")
            .conditional("step_2", vec![BranchSpec::when("count < 3", "step_2")], END)
    }

    #[tokio::test]
    async fn test_create_and_run_graph() {
        let service = service().await;
        let graph_id = service.create_graph(&counter_spec()).await.unwrap();
        assert_eq!(service.graph_spec(&graph_id).await.unwrap(), counter_spec());

        let run_id = service.submit(&graph_id, json!("Test Run"), None).await.unwrap();
        let record = service.wait_for(&run_id, Duration::from_secs(5)).await.unwrap();

        assert_eq!(record.status, RunStatus::Completed);
        assert_eq!(record.state.get_f64("count"), Some(3.0));
        assert_eq!(record.graph_id, graph_id);
        assert_eq!(record.log().last().map(String::as_str), Some("Workflow reached END."));
    }

    #[tokio::test]
    async fn test_submit_unknown_graph() {
        let service = service().await;
        let err = service.submit("nope", json!(null), None).await.unwrap_err();
        assert!(matches!(err, EngineError::GraphNotFound(_)));
    }

    #[tokio::test]
    async fn test_zero_budget_rejected() {
        let service = service().await;
        let graph_id = service.create_graph(&counter_spec()).await.unwrap();
        let err = service.submit(&graph_id, json!(null), Some(0)).await.unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[tokio::test]
    async fn test_oversized_budget_rejected() {
        let service = service().await;
        let graph_id = service.create_graph(&counter_spec()).await.unwrap();
        let err = service
            .submit(&graph_id, json!(null), Some(u32::MAX))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Config(ref msg) if msg.contains("exceeds")));
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn test_panicking_step_fails_run() {
        let service = service().await;
        let spec = GraphSpec::new("panics")
            .node("a", "start_step")
            .node("b", "panic")
            .entry("a")
            .edge("a", "b")
            .edge("b", END);
        let graph_id = service.create_graph(&spec).await.unwrap();

        let run_id = service.submit(&graph_id, json!(null), None).await.unwrap();
        let record = service.wait_for(&run_id, Duration::from_secs(5)).await.unwrap();
        assert_eq!(record.status, RunStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("Error in node b: step panicked"));
        assert_eq!(
            record.log().last().map(String::as_str),
            Some("Error in node b: step panicked")
        );

        // Workers survive and keep draining the queue
        let counter_id = service.create_graph(&counter_spec()).await.unwrap();
        let run_id = service.submit(&counter_id, json!(null), None).await.unwrap();
        let record = service.wait_for(&run_id, Duration::from_secs(5)).await.unwrap();
        assert_eq!(record.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_per_run_budget_override() {
        let service = service().await;
        let graph_id = service.create_graph(&counter_spec()).await.unwrap();

        let run_id = service.submit(&graph_id, json!(null), Some(2)).await.unwrap();
        let record = service.wait_for(&run_id, Duration::from_secs(5)).await.unwrap();
        assert_eq!(record.status, RunStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("Step budget of 2 rounds exceeded"));
    }

    #[tokio::test]
    async fn test_failed_step_recorded() {
        let service = service().await;
        let spec = GraphSpec::new("bad")
            .node("a", "start_step")
            .node("b", "explode")
            .entry("a")
            .edge("a", "b")
            .edge("b", END);
        let graph_id = service.create_graph(&spec).await.unwrap();

        let run_id = service.submit(&graph_id, json!(null), None).await.unwrap();
        let record = service.wait_for(&run_id, Duration::from_secs(5)).await.unwrap();
        assert_eq!(record.status, RunStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("Error in node b: kaboom"));
        assert_eq!(record.state.get("count"), Some(&json!(0)));
    }

    #[tokio::test]
    async fn test_unknown_step_creates_nothing() {
        let service = service().await;
        let spec = GraphSpec::new("ghost").node("a", "vanish").entry("a").edge("a", END);

        let err = service.create_graph(&spec).await.unwrap_err();
        assert!(matches!(err, EngineError::UnknownStepName { .. }));
        assert!(service.list_graphs().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_unknown_and_finished() {
        let service = service().await;
        assert!(matches!(
            service.cancel("missing").await,
            Err(EngineError::RunNotFound(_))
        ));

        let graph_id = service.create_graph(&counter_spec()).await.unwrap();
        let run_id = service.submit(&graph_id, json!(null), None).await.unwrap();
        service.wait_for(&run_id, Duration::from_secs(5)).await.unwrap();
        assert!(!service.cancel(&run_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let service = service().await;
        let graph_id = service.create_graph(&counter_spec()).await.unwrap();
        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(service.submit(&graph_id, json!(null), None).await.unwrap());
        }
        let runs = service.runs.clone();
        service.shutdown().await;

        for run_id in ids {
            assert_eq!(runs.get(&run_id).await.unwrap().status, RunStatus::Completed);
        }
    }
}
