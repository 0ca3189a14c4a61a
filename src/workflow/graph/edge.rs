// SPDX-License-Identifier: MIT

//! Edges and the transition resolver

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::engine::step::Predicate;
use crate::workflow::condition::{self, Expression};
use crate::workflow::state::WorkflowState;

/// Test guarding a conditional branch
#[derive(Clone)]
pub enum Guard {
    /// Parsed condition expression, with its source text
    Expression { source: String, expr: Expression },
    /// Predicate resolved from the registry
    Named {
        name: String,
        predicate: Arc<dyn Predicate>,
    },
}

impl Guard {
    pub fn test(&self, state: &WorkflowState) -> bool {
        match self {
            Guard::Expression { expr, .. } => condition::evaluate(expr, state),
            Guard::Named { predicate, .. } => predicate.test(state),
        }
    }

    /// Source expression or predicate name
    pub fn label(&self) -> &str {
        match self {
            Guard::Expression { source, .. } => source,
            Guard::Named { name, .. } => name,
        }
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Guard::Expression { source, .. } => f.debug_tuple("Expression").field(source).finish(),
            Guard::Named { name, .. } => f.debug_tuple("Named").field(name).finish(),
        }
    }
}

/// A guarded target
#[derive(Debug, Clone)]
pub struct Branch {
    pub guard: Guard,
    pub target: String,
}

/// Outbound transition of a node
#[derive(Debug, Clone)]
pub enum Edge {
    /// Always go to `target`
    Linear { target: String },
    /// First branch whose guard holds, otherwise `default`
    Conditional {
        branches: Vec<Branch>,
        default: String,
    },
}

/// How a resolution was reached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Route {
    Linear,
    Branch { index: usize, predicate: String },
    Default,
}

/// Result of resolving an edge
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution<'a> {
    pub target: &'a str,
    pub route: Route,
}

/// A routing decision recorded in the state's trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDecision {
    pub round: u32,
    pub from: String,
    pub to: String,
    pub route: Route,
}

impl Edge {
    pub fn linear(target: impl Into<String>) -> Self {
        Edge::Linear {
            target: target.into(),
        }
    }

    /// Decide the next node id.
    ///
    /// Reads the state only, so resolving the same edge against the same
    /// state always yields the same target.
    pub fn resolve(&self, state: &WorkflowState) -> Resolution<'_> {
        match self {
            Edge::Linear { target } => Resolution {
                target,
                route: Route::Linear,
            },
            Edge::Conditional { branches, default } => branches
                .iter()
                .enumerate()
                .find(|(_, branch)| branch.guard.test(state))
                .map(|(index, branch)| Resolution {
                    target: &branch.target,
                    route: Route::Branch {
                        index,
                        predicate: branch.guard.label().to_string(),
                    },
                })
                .unwrap_or(Resolution {
                    target: default,
                    route: Route::Default,
                }),
        }
    }

    pub fn is_conditional(&self) -> bool {
        matches!(self, Edge::Conditional { .. })
    }
}

impl fmt::Display for RouteDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.route {
            Route::Linear => write!(f, "{} -> {}", self.from, self.to),
            Route::Branch { index, predicate } => write!(
                f,
                "{} -> {} (branch {} matched: {})",
                self.from, self.to, index, predicate
            ),
            Route::Default => write!(f, "{} -> {} (default, no branch matched)", self.from, self.to),
        }
    }
}
