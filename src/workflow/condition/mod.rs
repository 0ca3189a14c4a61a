// SPDX-License-Identifier: MIT

//! Condition evaluation for conditional edges
//!
//! This module provides parsing and evaluation of branch conditions.
//! Conditions are simple expressions like:
//! - `complexity_score < 10`
//! - `status == 'done'`
//! - `kind == 'bug' and priority > 3`

mod ast;
mod evaluator;
mod parser;

pub use ast::{CompareOp, Expression, Literal};
pub use evaluator::evaluate;
pub use parser::{parse, ConditionError};
