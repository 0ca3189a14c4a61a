// SPDX-License-Identifier: MIT

//! Runtime state storage for workflow execution

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::mem;

use super::schema::{ReducerType, StateSchema};
use crate::workflow::graph::edge::RouteDecision;

/// The state container threaded through a run.
///
/// Holds the run input, the domain fields steps read and write, and the
/// engine-owned bookkeeping: current node, round counter, trace log and
/// routing decisions. Bookkeeping has no public mutators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WorkflowState {
    /// Input the run was submitted with
    #[serde(default)]
    input: Value,
    /// Domain fields
    #[serde(default)]
    data: BTreeMap<String, Value>,
    #[serde(default)]
    current_node: Option<String>,
    #[serde(default)]
    round: u32,
    #[serde(default)]
    logs: Vec<String>,
    #[serde(default)]
    routes: Vec<RouteDecision>,
    #[serde(skip)]
    reducers: BTreeMap<String, ReducerType>,
}

/// Engine bookkeeping held aside while a step owns the state
pub(crate) struct Ledger {
    current_node: Option<String>,
    round: u32,
    logs: Vec<String>,
    routes: Vec<RouteDecision>,
}

impl WorkflowState {
    /// Create a state holding only the run input
    pub fn new(input: Value) -> Self {
        Self {
            input,
            ..Self::default()
        }
    }

    /// Create a state from a schema, applying field defaults and reducers
    pub fn with_schema(schema: &StateSchema, input: Value) -> Self {
        let mut state = Self::new(input);

        for (name, def) in &schema.fields {
            if let Some(default) = &def.default {
                state.data.insert(name.clone(), default.clone());
            }
            state.reducers.insert(name.clone(), def.reducer);
        }

        state
    }

    /// The input the run was submitted with
    pub fn input(&self) -> &Value {
        &self.input
    }

    /// Update a field using the appropriate reducer
    pub fn update(&mut self, key: &str, value: Value) {
        let reducer = self
            .reducers
            .get(key)
            .copied()
            .unwrap_or(ReducerType::Overwrite);

        match reducer {
            ReducerType::Overwrite => {
                self.data.insert(key.to_string(), value);
            }
            ReducerType::Append => {
                let arr = self
                    .data
                    .entry(key.to_string())
                    .or_insert(Value::Array(vec![]));
                if let Value::Array(a) = arr {
                    match value {
                        Value::Array(new_items) => a.extend(new_items),
                        other => a.push(other),
                    }
                }
            }
            ReducerType::Max => {
                let current = self.data.get(key).and_then(|v| v.as_f64());
                if let Some(new) = value.as_f64() {
                    if current.map_or(true, |c| new > c) {
                        self.data.insert(key.to_string(), value);
                    }
                }
            }
            ReducerType::Min => {
                let current = self.data.get(key).and_then(|v| v.as_f64());
                if let Some(new) = value.as_f64() {
                    if current.map_or(true, |c| new < c) {
                        self.data.insert(key.to_string(), value);
                    }
                }
            }
            ReducerType::Merge => {
                let current = self
                    .data
                    .entry(key.to_string())
                    .or_insert(Value::Object(Map::new()));
                if let (Value::Object(current_obj), Value::Object(new_obj)) = (current, value) {
                    for (k, v) in new_obj {
                        current_obj.insert(k, v);
                    }
                }
            }
        }
    }

    /// Get a field value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Get a field as f64
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.data.get(key).and_then(Value::as_f64)
    }

    /// Get a nested field value using dot notation (e.g., "result.intent").
    ///
    /// The root `input` addresses the run input unless a field of that
    /// name exists.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let root = parts.next()?;

        let mut current = match self.data.get(root) {
            Some(v) => v,
            None if root == "input" => &self.input,
            None => return None,
        };
        for part in parts {
            current = current.get(part)?;
        }
        Some(current)
    }

    /// Domain fields as a JSON object
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.data
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Node the executor is on (or stopped at)
    pub fn current_node(&self) -> Option<&str> {
        self.current_node.as_deref()
    }

    /// Zero-based index of the current round
    pub fn round(&self) -> u32 {
        self.round
    }

    /// Ordered trace log
    pub fn logs(&self) -> &[String] {
        &self.logs
    }

    /// Routing decisions taken on conditional edges, in order
    pub fn routes(&self) -> &[RouteDecision] {
        &self.routes
    }

    pub(crate) fn begin(&mut self, entry: &str) {
        self.current_node = Some(entry.to_string());
        self.round = 0;
    }

    pub(crate) fn advance(&mut self, next: &str) {
        self.current_node = Some(next.to_string());
        self.round += 1;
    }

    pub(crate) fn push_log(&mut self, message: impl Into<String>) {
        self.logs.push(message.into());
    }

    pub(crate) fn push_route(&mut self, decision: RouteDecision) {
        self.routes.push(decision);
    }

    /// Move the bookkeeping out so a step only sees domain data plus a copy
    /// of the current node and round.
    pub(crate) fn detach_ledger(&mut self) -> Ledger {
        Ledger {
            current_node: self.current_node.clone(),
            round: self.round,
            logs: mem::take(&mut self.logs),
            routes: mem::take(&mut self.routes),
        }
    }

    /// Restore bookkeeping, discarding whatever a step put there
    pub(crate) fn attach_ledger(&mut self, ledger: Ledger) {
        self.current_node = ledger.current_node;
        self.round = ledger.round;
        self.logs = ledger.logs;
        self.routes = ledger.routes;
    }
}
