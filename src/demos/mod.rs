// SPDX-License-Identifier: MIT

//! Bundled demo workflows

pub mod code_review;
pub mod counter;

use crate::engine::error::EngineError;
use crate::service::WorkflowService;
use crate::workflow::graph::GraphSpec;
use crate::workflow::registry::StepRegistry;

/// Register every demo step and predicate
pub async fn register_all(registry: &StepRegistry) {
    code_review::register(registry).await;
    counter::register(registry).await;
}

/// Demo graphs with the ids they are stored under
pub fn graph_specs() -> Vec<(&'static str, GraphSpec)> {
    vec![
        (code_review::GRAPH_ID, code_review::graph_spec()),
        (counter::GRAPH_ID, counter::graph_spec()),
    ]
}

/// Store the demo graphs in a service whose registry already has the demo steps
pub async fn install(service: &WorkflowService) -> Result<(), EngineError> {
    for (graph_id, spec) in graph_specs() {
        service.insert_graph(graph_id, &spec).await?;
    }
    Ok(())
}

/// Registry holding only the demo steps
pub async fn registry() -> StepRegistry {
    let registry = StepRegistry::new();
    register_all(&registry).await;
    registry
}
