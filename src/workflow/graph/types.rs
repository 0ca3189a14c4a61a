// SPDX-License-Identifier: MIT

//! Graph workflow type definitions
//!
//! `GraphSpec` is the declarative, serializable form of a graph: what the
//! HTTP layer accepts, what YAML/JSON files contain, and what a built
//! `GraphDefinition` converts back into for storage.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::engine::error::ValidationError;
use crate::workflow::condition;
use crate::workflow::state::StateSchema;

/// Reserved edge target that ends a run successfully
pub const END: &str = "END";

/// A graph-based workflow definition
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct GraphSpec {
    /// Name of the workflow
    pub name: String,
    /// Description of the workflow
    #[serde(default)]
    pub description: String,
    /// Nodes in the graph
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    /// Unconditional edges
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
    /// Branching edges
    #[serde(default)]
    pub conditional_edges: Vec<ConditionalEdgeSpec>,
    /// Node the run starts at
    #[serde(default)]
    pub entry_point: Option<String>,
    /// Domain field declarations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<StateSchema>,
}

/// A node in the workflow graph
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct NodeSpec {
    /// Unique identifier for this node
    pub name: String,
    /// Registered step the node runs
    #[serde(alias = "tool_name")]
    pub step: String,
}

/// Unconditional transition
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EdgeSpec {
    #[serde(alias = "from")]
    pub from_node: String,
    #[serde(alias = "to")]
    pub to_node: String,
}

/// Transition chosen by the first matching branch, or `default`
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ConditionalEdgeSpec {
    #[serde(alias = "from")]
    pub from_node: String,
    /// Evaluated in order
    #[serde(default)]
    pub branches: Vec<BranchSpec>,
    /// Target when no branch matches
    pub default: String,
}

/// One guarded target of a conditional edge.
///
/// Exactly one of `when` (a condition expression) or `condition` (the name
/// of a registered predicate) must be set.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BranchSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    pub to: String,
}

impl BranchSpec {
    /// Branch guarded by a condition expression
    pub fn when(expression: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            when: Some(expression.into()),
            condition: None,
            to: to.into(),
        }
    }

    /// Branch guarded by a registered predicate
    pub fn condition(name: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            when: None,
            condition: Some(name.into()),
            to: to.into(),
        }
    }
}

impl GraphSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn node(mut self, name: impl Into<String>, step: impl Into<String>) -> Self {
        self.nodes.push(NodeSpec {
            name: name.into(),
            step: step.into(),
        });
        self
    }

    pub fn edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.push(EdgeSpec {
            from_node: from.into(),
            to_node: to.into(),
        });
        self
    }

    pub fn conditional(
        mut self,
        from: impl Into<String>,
        branches: Vec<BranchSpec>,
        default: impl Into<String>,
    ) -> Self {
        self.conditional_edges.push(ConditionalEdgeSpec {
            from_node: from.into(),
            branches,
            default: default.into(),
        });
        self
    }

    pub fn entry(mut self, name: impl Into<String>) -> Self {
        self.entry_point = Some(name.into());
        self
    }

    pub fn with_state(mut self, schema: StateSchema) -> Self {
        self.state = Some(schema);
        self
    }

    /// Check the structural invariants that do not need a registry
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut node_ids: HashSet<&str> = HashSet::new();
        for node in &self.nodes {
            if node.name == END {
                return Err(ValidationError::ReservedNodeId(node.name.clone()));
            }
            if !node_ids.insert(node.name.as_str()) {
                return Err(ValidationError::DuplicateNodeId(node.name.clone()));
            }
        }

        let entry = self
            .entry_point
            .as_deref()
            .ok_or(ValidationError::MissingEntryNode)?;
        if !node_ids.contains(entry) {
            return Err(ValidationError::UnknownEntryNode(entry.to_string()));
        }

        let known_target = |target: &str| target == END || node_ids.contains(target);
        let mut sources: HashSet<&str> = HashSet::new();

        for edge in &self.edges {
            check_source(&node_ids, &mut sources, &edge.from_node)?;
            if !known_target(&edge.to_node) {
                return Err(ValidationError::DanglingEdgeTarget {
                    source_node: edge.from_node.clone(),
                    target: edge.to_node.clone(),
                });
            }
        }

        for edge in &self.conditional_edges {
            check_source(&node_ids, &mut sources, &edge.from_node)?;

            let targets = edge
                .branches
                .iter()
                .map(|b| b.to.as_str())
                .chain(std::iter::once(edge.default.as_str()));
            for target in targets {
                if !known_target(target) {
                    return Err(ValidationError::DanglingEdgeTarget {
                        source_node: edge.from_node.clone(),
                        target: target.to_string(),
                    });
                }
            }

            for (index, branch) in edge.branches.iter().enumerate() {
                match (&branch.when, &branch.condition) {
                    (Some(expression), None) => {
                        condition::parse(expression).map_err(|e| {
                            ValidationError::InvalidCondition {
                                source_node: edge.from_node.clone(),
                                condition: expression.clone(),
                                reason: e.to_string(),
                            }
                        })?;
                    }
                    (None, Some(_)) => {}
                    _ => {
                        return Err(ValidationError::InvalidBranch {
                            source_node: edge.from_node.clone(),
                            index,
                        })
                    }
                }
            }
        }

        Ok(())
    }
}

/// A source must be a declared node with no other outbound edge
fn check_source<'a>(
    node_ids: &HashSet<&str>,
    sources: &mut HashSet<&'a str>,
    source: &'a str,
) -> Result<(), ValidationError> {
    if !node_ids.contains(source) {
        return Err(ValidationError::UnknownEdgeSource(source.to_string()));
    }
    if !sources.insert(source) {
        return Err(ValidationError::MultipleOutboundEdges(source.to_string()));
    }
    Ok(())
}
