// SPDX-License-Identifier: MIT

//! Validated, immutable graph definitions

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::edge::{Branch, Edge, Guard};
use super::types::{BranchSpec, ConditionalEdgeSpec, EdgeSpec, GraphSpec, NodeSpec};
use crate::engine::error::{EngineError, ValidationError};
use crate::engine::step::Step;
use crate::workflow::condition;
use crate::workflow::registry::StepRegistry;
use crate::workflow::state::{StateSchema, WorkflowState};

/// A node with its step already resolved
#[derive(Clone)]
pub struct Node {
    id: String,
    step_name: String,
    step: Arc<dyn Step>,
}

impl Node {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn step_name(&self) -> &str {
        &self.step_name
    }

    pub fn step(&self) -> &Arc<dyn Step> {
        &self.step
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("step", &self.step_name)
            .finish()
    }
}

/// A validated graph. Nothing mutates it after `build`.
#[derive(Debug, Clone)]
pub struct GraphDefinition {
    name: String,
    description: String,
    nodes: HashMap<String, Node>,
    node_order: Vec<String>, // declaration order, for deterministic listing
    edges: HashMap<String, Edge>,
    edge_order: Vec<String>,
    entry: String,
    schema: Option<StateSchema>,
}

impl GraphDefinition {
    /// Validate a spec and resolve every step and predicate name.
    ///
    /// Structural problems are reported before registry misses, so a graph
    /// that is both malformed and references unknown steps fails validation.
    pub async fn build(spec: &GraphSpec, registry: &StepRegistry) -> Result<Self, EngineError> {
        spec.validate()?;

        let mut nodes = HashMap::with_capacity(spec.nodes.len());
        let mut node_order = Vec::with_capacity(spec.nodes.len());
        for node_spec in &spec.nodes {
            let step = registry
                .get(&node_spec.step)
                .await
                .ok_or_else(|| EngineError::unknown_step(&node_spec.step))?;
            node_order.push(node_spec.name.clone());
            nodes.insert(
                node_spec.name.clone(),
                Node {
                    id: node_spec.name.clone(),
                    step_name: node_spec.step.clone(),
                    step,
                },
            );
        }

        let mut edges = HashMap::new();
        let mut edge_order = Vec::new();
        for edge_spec in &spec.edges {
            edge_order.push(edge_spec.from_node.clone());
            edges.insert(edge_spec.from_node.clone(), Edge::linear(&edge_spec.to_node));
        }
        for edge_spec in &spec.conditional_edges {
            let mut branches = Vec::with_capacity(edge_spec.branches.len());
            for (index, branch) in edge_spec.branches.iter().enumerate() {
                let guard = Self::resolve_guard(&edge_spec.from_node, index, branch, registry).await?;
                branches.push(Branch {
                    guard,
                    target: branch.to.clone(),
                });
            }
            edge_order.push(edge_spec.from_node.clone());
            edges.insert(
                edge_spec.from_node.clone(),
                Edge::Conditional {
                    branches,
                    default: edge_spec.default.clone(),
                },
            );
        }

        let entry = spec
            .entry_point
            .clone()
            .ok_or(ValidationError::MissingEntryNode)?;

        log::info!(
            "Built graph '{}' with {} nodes and {} edges",
            spec.name,
            nodes.len(),
            edges.len()
        );

        Ok(Self {
            name: spec.name.clone(),
            description: spec.description.clone(),
            nodes,
            node_order,
            edges,
            edge_order,
            entry,
            schema: spec.state.clone(),
        })
    }

    async fn resolve_guard(
        source: &str,
        index: usize,
        branch: &BranchSpec,
        registry: &StepRegistry,
    ) -> Result<Guard, EngineError> {
        match (&branch.when, &branch.condition) {
            (Some(expression), None) => {
                let expr = condition::parse(expression).map_err(|e| {
                    ValidationError::InvalidCondition {
                        source_node: source.to_string(),
                        condition: expression.clone(),
                        reason: e.to_string(),
                    }
                })?;
                Ok(Guard::Expression {
                    source: expression.clone(),
                    expr,
                })
            }
            (None, Some(name)) => {
                let predicate = registry
                    .get_predicate(name)
                    .await
                    .ok_or_else(|| EngineError::unknown_predicate(name))?;
                Ok(Guard::Named {
                    name: name.clone(),
                    predicate,
                })
            }
            _ => Err(ValidationError::InvalidBranch {
                source_node: source.to_string(),
                index,
            }
            .into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Outbound edge of a node, if it has one
    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.get(id)
    }

    /// Node ids in declaration order
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.node_order.iter().map(String::as_str)
    }

    pub fn schema(&self) -> Option<&StateSchema> {
        self.schema.as_ref()
    }

    /// Fresh state for a run of this graph
    pub fn initial_state(&self, input: Value) -> WorkflowState {
        match &self.schema {
            Some(schema) => WorkflowState::with_schema(schema, input),
            None => WorkflowState::new(input),
        }
    }

    /// Re-derive the declarative form this graph was built from
    pub fn to_spec(&self) -> GraphSpec {
        let nodes = self
            .node_order
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .map(|node| NodeSpec {
                name: node.id.clone(),
                step: node.step_name.clone(),
            })
            .collect();

        let mut edges = Vec::new();
        let mut conditional_edges = Vec::new();
        for source in &self.edge_order {
            match self.edges.get(source) {
                Some(Edge::Linear { target }) => edges.push(EdgeSpec {
                    from_node: source.clone(),
                    to_node: target.clone(),
                }),
                Some(Edge::Conditional { branches, default }) => {
                    conditional_edges.push(ConditionalEdgeSpec {
                        from_node: source.clone(),
                        branches: branches
                            .iter()
                            .map(|branch| match &branch.guard {
                                Guard::Expression { source: text, .. } => {
                                    BranchSpec::when(text.clone(), branch.target.clone())
                                }
                                Guard::Named { name, .. } => {
                                    BranchSpec::condition(name.clone(), branch.target.clone())
                                }
                            })
                            .collect(),
                        default: default.clone(),
                    })
                }
                None => {}
            }
        }

        GraphSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            nodes,
            edges,
            conditional_edges,
            entry_point: Some(self.entry.clone()),
            state: self.schema.clone(),
        }
    }
}
