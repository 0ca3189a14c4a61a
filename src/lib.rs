// SPDX-License-Identifier: MIT

//! stepgraph-rs: a graph workflow engine
//!
//! Graphs of named steps connected by linear and conditional edges are
//! validated once, then executed by a bounded interpreter loop that threads
//! a `WorkflowState` through each node. Runs can be driven in-process with
//! an `Executor` or submitted to a `WorkflowService` and polled by id.

pub mod config;
pub mod demos;
pub mod engine;
pub mod service;
pub mod workflow;

pub use config::EngineConfig;
pub use engine::{EngineError, RunError, Step, StepError, ValidationError};
pub use service::WorkflowService;
pub use workflow::graph::{Executor, GraphDefinition, GraphSpec, RunOutcome, END};
pub use workflow::registry::StepRegistry;
pub use workflow::run::{RunRecord, RunStatus};
pub use workflow::state::WorkflowState;
