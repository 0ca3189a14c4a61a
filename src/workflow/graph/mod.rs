// SPDX-License-Identifier: MIT

//! Graph-based workflow execution
//!
//! This module provides the declarative graph types, the validated
//! `GraphDefinition` built from them, and the executor that walks it.

pub mod definition;
pub mod edge;
pub mod executor;
pub mod types;

pub use definition::{GraphDefinition, Node};
pub use edge::{Branch, Edge, Guard, Resolution, Route, RouteDecision};
pub use executor::{Executor, NoopObserver, RunObserver, RunOutcome, END_REACHED};
pub use types::{BranchSpec, ConditionalEdgeSpec, EdgeSpec, GraphSpec, NodeSpec, END};
