// SPDX-License-Identifier: MIT

//! Engine contracts - errors and the step interface
//!
//! This module provides the pieces every other module builds on:
//! - `Step` - the capability a node implementation provides
//! - `Predicate` - a pure test guarding a conditional branch
//! - the typed error hierarchy

pub mod error;
pub mod step;

pub use error::{EngineError, RunError, StepError, ValidationError};
pub use step::{FnStep, Predicate, Step};
