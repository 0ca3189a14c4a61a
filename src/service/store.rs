// SPDX-License-Identifier: MIT

//! In-memory graph and run stores

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::engine::error::EngineError;
use crate::workflow::graph::GraphDefinition;
use crate::workflow::run::RunRecord;

/// Listing entry for a stored graph
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GraphSummary {
    pub graph_id: String,
    pub name: String,
    pub description: String,
}

/// Built graphs keyed by graph id
#[derive(Clone, Default)]
pub struct GraphStore {
    graphs: Arc<RwLock<HashMap<String, Arc<GraphDefinition>>>>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, graph_id: impl Into<String>, graph: GraphDefinition) {
        let graph_id = graph_id.into();
        let mut graphs = self.graphs.write().await;
        if graphs.insert(graph_id.clone(), Arc::new(graph)).is_some() {
            log::warn!("Graph '{}' replaced", graph_id);
        }
    }

    pub async fn get(&self, graph_id: &str) -> Result<Arc<GraphDefinition>, EngineError> {
        let graphs = self.graphs.read().await;
        graphs
            .get(graph_id)
            .cloned()
            .ok_or_else(|| EngineError::GraphNotFound(graph_id.to_string()))
    }

    /// All graphs, sorted by id
    pub async fn list(&self) -> Vec<GraphSummary> {
        let graphs = self.graphs.read().await;
        let mut summaries: Vec<GraphSummary> = graphs
            .iter()
            .map(|(id, graph)| GraphSummary {
                graph_id: id.clone(),
                name: graph.name().to_string(),
                description: graph.description().to_string(),
            })
            .collect();
        summaries.sort_by(|a, b| a.graph_id.cmp(&b.graph_id));
        summaries
    }
}

/// Run records plus the cancellation token of every live run
#[derive(Clone, Default)]
pub struct RunStore {
    records: Arc<RwLock<HashMap<String, RunRecord>>>,
    tokens: Arc<RwLock<HashMap<String, CancellationToken>>>,
}

impl RunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a freshly submitted record; returns its cancellation token
    pub async fn insert(&self, record: RunRecord) -> CancellationToken {
        let token = CancellationToken::new();
        let run_id = record.run_id.clone();
        self.tokens
            .write()
            .await
            .insert(run_id.clone(), token.clone());
        self.records.write().await.insert(run_id, record);
        token
    }

    /// Snapshot of a record
    pub async fn get(&self, run_id: &str) -> Result<RunRecord, EngineError> {
        let records = self.records.read().await;
        records
            .get(run_id)
            .cloned()
            .ok_or_else(|| EngineError::RunNotFound(run_id.to_string()))
    }

    /// Apply a write to a record. Returns whether the record accepted it.
    pub async fn update<F>(&self, run_id: &str, write: F) -> bool
    where
        F: FnOnce(&mut RunRecord) -> bool,
    {
        let mut records = self.records.write().await;
        match records.get_mut(run_id) {
            Some(record) => write(record),
            None => {
                log::warn!("Write to unknown run {}", run_id);
                false
            }
        }
    }

    /// Request cancellation. `Ok(false)` when the run already finished.
    pub async fn cancel(&self, run_id: &str) -> Result<bool, EngineError> {
        let record = self.get(run_id).await?;
        if record.status.is_terminal() {
            return Ok(false);
        }
        let tokens = self.tokens.read().await;
        match tokens.get(run_id) {
            Some(token) if !token.is_cancelled() => {
                token.cancel();
                log::info!("Cancellation requested for run {}", run_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Drop the token of a finished run
    pub async fn release(&self, run_id: &str) {
        self.tokens.write().await.remove(run_id);
    }

    /// Forget a run that never made it onto the queue
    pub async fn remove(&self, run_id: &str) -> Option<RunRecord> {
        self.tokens.write().await.remove(run_id);
        self.records.write().await.remove(run_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::error::RunError;
    use crate::workflow::graph::{GraphSpec, RunOutcome, END};
    use crate::workflow::registry::StepRegistry;
    use crate::workflow::state::WorkflowState;
    use serde_json::json;

    async fn graph(name: &str) -> GraphDefinition {
        let registry = StepRegistry::new();
        registry.register_fn("noop", Ok).await;
        let spec = GraphSpec::new(name).node("a", "noop").entry("a").edge("a", END);
        GraphDefinition::build(&spec, &registry).await.unwrap()
    }

    #[tokio::test]
    async fn test_graph_store() {
        let store = GraphStore::new();
        store.insert("b-id", graph("second").await).await;
        store.insert("a-id", graph("first").await).await;

        assert_eq!(store.get("a-id").await.unwrap().name(), "first");
        assert!(matches!(
            store.get("missing").await,
            Err(EngineError::GraphNotFound(_))
        ));

        let ids: Vec<_> = store.list().await.into_iter().map(|s| s.graph_id).collect();
        assert_eq!(ids, vec!["a-id", "b-id"]);
    }

    #[tokio::test]
    async fn test_run_store_round_trip() {
        let store = RunStore::new();
        let record = RunRecord::pending("g", WorkflowState::new(json!(1)));
        let run_id = record.run_id.clone();
        store.insert(record.clone()).await;

        assert_eq!(store.get(&run_id).await.unwrap(), record);
        assert!(matches!(
            store.get("nope").await,
            Err(EngineError::RunNotFound(_))
        ));
        assert!(!store.update("nope", |_| true).await);

        assert_eq!(store.remove(&run_id).await, Some(record));
        assert!(matches!(
            store.get(&run_id).await,
            Err(EngineError::RunNotFound(_))
        ));
        assert!(matches!(
            store.cancel(&run_id).await,
            Err(EngineError::RunNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_live_and_finished_runs() {
        let store = RunStore::new();
        let record = RunRecord::pending("g", WorkflowState::default());
        let run_id = record.run_id.clone();
        let token = store.insert(record).await;

        assert!(store.cancel(&run_id).await.unwrap());
        assert!(token.is_cancelled());
        // second request has nothing left to cancel
        assert!(!store.cancel(&run_id).await.unwrap());

        let state = WorkflowState::default();
        store.update(&run_id, |r| r.mark_running(&state)).await;
        store
            .update(&run_id, |r| {
                r.finish(&RunOutcome::Failed {
                    error: RunError::Cancelled,
                    state: state.clone(),
                })
            })
            .await;
        store.release(&run_id).await;
        assert!(!store.cancel(&run_id).await.unwrap());

        assert!(matches!(
            store.cancel("unknown").await,
            Err(EngineError::RunNotFound(_))
        ));
    }
}
