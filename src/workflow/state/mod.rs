// SPDX-License-Identifier: MIT

//! State management for graph workflows
//!
//! This module provides:
//! - `StateSchema` - declares domain fields, their defaults and reducers
//! - `WorkflowState` - the state container threaded through a run
//! - `ReducerType` - strategies for merging values into state

mod schema;
mod store;

pub use schema::{FieldType, ReducerType, StateFieldDef, StateSchema};
pub use store::WorkflowState;
