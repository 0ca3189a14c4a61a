// SPDX-License-Identifier: MIT

//! Code review loop: extract functions, score complexity, keep suggesting
//! improvements until the score passes the quality gate.

use serde_json::{json, Value};

use crate::engine::error::StepError;
use crate::workflow::graph::{BranchSpec, GraphSpec, END};
use crate::workflow::registry::StepRegistry;
use crate::workflow::state::{FieldType, ReducerType, StateFieldDef, StateSchema, WorkflowState};

/// Id the graph is stored under at startup
pub const GRAPH_ID: &str = "demo-review";

/// Scores below this pass the gate
pub const QUALITY_THRESHOLD: f64 = 10.0;

/// Each improvement round lowers the perceived score by this much
const ROUND_DISCOUNT: i64 = 5;

pub async fn register(registry: &StepRegistry) {
    registry.register_fn("extract_code", extract_code).await;
    registry.register_fn("check_complexity", check_complexity).await;
    registry
        .register_fn("generate_improvements", generate_improvements)
        .await;
    registry
        .register_predicate("passes_quality_gate", passes_quality_gate)
        .await;
}

pub fn graph_spec() -> GraphSpec {
    GraphSpec::new("code-review")
        .with_description("Analyze code and loop on improvements until it passes the quality gate")
        .node("extract", "extract_code")
        .node("analyze", "check_complexity")
        .node("improve", "generate_improvements")
        .entry("extract")
        .edge("extract", "analyze")
        .conditional(
            "analyze",
            vec![BranchSpec::condition("passes_quality_gate", END)],
            "improve",
        )
        .edge("improve", "analyze")
        .with_state(
            StateSchema::default()
                .field(
                    "review_round",
                    StateFieldDef::new(FieldType::Number).with_default(json!(0)),
                )
                .field("complexity_score", StateFieldDef::new(FieldType::Number))
                .field("functions", StateFieldDef::new(FieldType::Array))
                .field(
                    "suggestions",
                    StateFieldDef::new(FieldType::Array).with_reducer(ReducerType::Append),
                ),
        )
}

fn source(state: &WorkflowState) -> Result<&str, StepError> {
    state
        .input()
        .as_str()
        .ok_or_else(|| StepError::InvalidInput("expected source code as a string".to_string()))
}

fn extract_code(mut state: WorkflowState) -> Result<WorkflowState, StepError> {
    let functions: Vec<Value> = source(&state)?
        .lines()
        .filter_map(|line| {
            let (_, rest) = line.split_once("def ")?;
            let name = rest.split('(').next()?.trim();
            (!name.is_empty()).then(|| json!(name))
        })
        .collect();

    log::info!("Extracted {} functions", functions.len());
    state.update("functions", Value::Array(functions));
    state.update("review_round", json!(0));
    Ok(state)
}

fn check_complexity(mut state: WorkflowState) -> Result<WorkflowState, StepError> {
    let code = source(&state)?;
    let score: i64 = [("for", 5), ("if", 5), ("while", 5), ("nested", 10)]
        .iter()
        .filter(|(keyword, _)| code.contains(keyword))
        .map(|(_, weight)| weight)
        .sum();

    let round = state
        .get("review_round")
        .and_then(Value::as_i64)
        .unwrap_or(0);
    let adjusted = (score - round * ROUND_DISCOUNT).max(0);

    log::info!("Complexity score {} (round {})", adjusted, round);
    state.update("complexity_score", json!(adjusted));
    Ok(state)
}

fn generate_improvements(mut state: WorkflowState) -> Result<WorkflowState, StepError> {
    let round = state
        .get("review_round")
        .and_then(Value::as_i64)
        .ok_or_else(|| StepError::MissingField("review_round".to_string()))?;
    let score = state.get_f64("complexity_score").unwrap_or_default();

    state.update(
        "suggestions",
        json!(format!("Round {}: reduce branching (score {})", round + 1, score)),
    );
    state.update("review_round", json!(round + 1));
    Ok(state)
}

/// Missing scores never pass
fn passes_quality_gate(state: &WorkflowState) -> bool {
    state.get_f64("complexity_score").unwrap_or(100.0) < QUALITY_THRESHOLD
}
