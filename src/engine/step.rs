// SPDX-License-Identifier: MIT

use async_trait::async_trait;

use super::error::StepError;
use crate::workflow::state::WorkflowState;

/// Trait for the unit of work a graph node runs.
///
/// A step consumes the state and hands back the updated state. The engine
/// treats implementations as opaque: it only knows their name and this
/// input/output contract. Engine bookkeeping (current node, round, trace)
/// is restored by the executor after the call, so a step cannot clobber it.
#[async_trait]
pub trait Step: Send + Sync {
    /// Returns the name the step is registered under
    fn name(&self) -> &str;

    /// Run the step against the current state
    async fn run(&self, state: WorkflowState) -> Result<WorkflowState, StepError>;
}

/// A pure boolean test over the state, used to guard conditional branches.
///
/// Taking `&WorkflowState` means a predicate can never mutate the run,
/// which lets the resolver re-evaluate routing without side effects.
pub trait Predicate: Send + Sync {
    fn test(&self, state: &WorkflowState) -> bool;
}

impl<F> Predicate for F
where
    F: Fn(&WorkflowState) -> bool + Send + Sync,
{
    fn test(&self, state: &WorkflowState) -> bool {
        self(state)
    }
}

/// Adapter turning a synchronous closure into a `Step`
pub struct FnStep<F> {
    name: String,
    func: F,
}

impl<F> FnStep<F>
where
    F: Fn(WorkflowState) -> Result<WorkflowState, StepError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

#[async_trait]
impl<F> Step for FnStep<F>
where
    F: Fn(WorkflowState) -> Result<WorkflowState, StepError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, state: WorkflowState) -> Result<WorkflowState, StepError> {
        (self.func)(state)
    }
}
