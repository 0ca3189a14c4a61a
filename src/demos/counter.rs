// SPDX-License-Identifier: MIT

//! Counter loop: start, then increment and check until the count reaches 3

use serde_json::json;

use crate::engine::error::StepError;
use crate::workflow::graph::{BranchSpec, GraphSpec, END};
use crate::workflow::registry::StepRegistry;
use crate::workflow::state::WorkflowState;

pub const GRAPH_ID: &str = "demo-counter";

pub async fn register(registry: &StepRegistry) {
    registry.register_fn("start_step", start_step).await;
    registry.register_fn("increment", increment).await;
    registry.register_fn("check_value", check_value).await;
}

pub fn graph_spec() -> GraphSpec {
    GraphSpec::new("counter")
        .with_description("Increment a counter until it reaches 3")
        .node("step_1", "start_step")
        .node("step_2", "increment")
        .node("step_3", "check_value")
        .entry("step_1")
        .edge("step_1", "step_2")
        .edge("step_2", "step_3")
        .conditional("step_3", vec![BranchSpec::when("count < 3", "step_2")], END)
}

fn start_step(mut state: WorkflowState) -> Result<WorkflowState, StepError> {
    state.update("status", json!("started"));
    state.update("count", json!(0));
    Ok(state)
}

fn increment(mut state: WorkflowState) -> Result<WorkflowState, StepError> {
    let count = state
        .get("count")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| StepError::MissingField("count".to_string()))?;
    state.update("count", json!(count + 1));
    Ok(state)
}

fn check_value(state: WorkflowState) -> Result<WorkflowState, StepError> {
    log::info!("Current count is {}", state.get("count").cloned().unwrap_or_default());
    Ok(state)
}
