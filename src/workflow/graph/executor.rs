// SPDX-License-Identifier: MIT

//! Graph workflow executor
//!
//! Drives one run through a `GraphDefinition`: execute the current node,
//! resolve its outbound edge, advance, repeat until `END`, a failure, the
//! round budget or cancellation.

use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use tokio_util::sync::CancellationToken;

use super::definition::GraphDefinition;
use super::edge::RouteDecision;
use super::types::END;
use crate::engine::error::{RunError, StepError};
use crate::workflow::run::RunStatus;
use crate::workflow::state::WorkflowState;

/// Trace entry written when a run reaches the terminal sentinel
pub const END_REACHED: &str = "Workflow reached END.";

/// Error message recorded when a step panics
pub const STEP_PANICKED: &str = "step panicked";

/// Receives snapshots while a run progresses
#[async_trait]
pub trait RunObserver: Send + Sync {
    /// Called once, before the first node executes
    async fn on_start(&self, _state: &WorkflowState) {}

    /// Called after each advance to a new node
    async fn on_round(&self, _state: &WorkflowState) {}

    /// Called once with the final outcome
    async fn on_finish(&self, _outcome: &RunOutcome) {}
}

/// Observer that ignores everything
pub struct NoopObserver;

#[async_trait]
impl RunObserver for NoopObserver {}

/// Terminal result of a run
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(WorkflowState),
    Failed {
        error: RunError,
        /// State as of the last successful step
        state: WorkflowState,
    },
}

impl RunOutcome {
    pub fn state(&self) -> &WorkflowState {
        match self {
            RunOutcome::Completed(state) => state,
            RunOutcome::Failed { state, .. } => state,
        }
    }

    pub fn into_state(self) -> WorkflowState {
        match self {
            RunOutcome::Completed(state) => state,
            RunOutcome::Failed { state, .. } => state,
        }
    }

    pub fn error(&self) -> Option<&RunError> {
        match self {
            RunOutcome::Completed(_) => None,
            RunOutcome::Failed { error, .. } => Some(error),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }

    pub fn status(&self) -> RunStatus {
        match self {
            RunOutcome::Completed(_) => RunStatus::Completed,
            RunOutcome::Failed { .. } => RunStatus::Failed,
        }
    }
}

/// The interpreter loop, bounded by a round budget
#[derive(Debug, Clone, Copy)]
pub struct Executor {
    max_rounds: u32,
}

impl Executor {
    pub fn new(max_rounds: u32) -> Self {
        Self { max_rounds }
    }

    pub fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    /// Run to completion without observation or cancellation
    pub async fn run(&self, graph: &GraphDefinition, state: WorkflowState) -> RunOutcome {
        self.run_observed(graph, state, &NoopObserver, &CancellationToken::new())
            .await
    }

    /// Run to completion, reporting progress to `observer`.
    ///
    /// `cancel` is checked at each iteration boundary; a step that is
    /// already running is never interrupted.
    pub async fn run_observed(
        &self,
        graph: &GraphDefinition,
        mut state: WorkflowState,
        observer: &dyn RunObserver,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        state.begin(graph.entry());
        observer.on_start(&state).await;
        log::info!(
            "Starting graph '{}' at '{}' (budget {} rounds)",
            graph.name(),
            graph.entry(),
            self.max_rounds
        );

        let outcome = loop {
            if cancel.is_cancelled() {
                break fail(state, RunError::Cancelled);
            }
            if state.round() >= self.max_rounds {
                break fail(
                    state,
                    RunError::StepBudgetExceeded {
                        limit: self.max_rounds,
                    },
                );
            }

            let node_id = state.current_node().unwrap_or_default().to_string();
            let node = match graph.node(&node_id) {
                Some(node) => node,
                None => break fail(state, RunError::UnknownNode(node_id)),
            };

            state.push_log(format!("Executing Node: {}", node_id));
            log::info!("Round {}: executing node '{}'", state.round(), node_id);

            let ledger = state.detach_ledger();
            let before = state.clone();
            // A panicking step fails the run like a step error
            let result = AssertUnwindSafe(node.step().run(state))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(StepError::failed(STEP_PANICKED)));
            state = match result {
                Ok(mut next) => {
                    next.attach_ledger(ledger);
                    next
                }
                Err(e) => {
                    let mut restored = before;
                    restored.attach_ledger(ledger);
                    break fail(
                        restored,
                        RunError::StepExecution {
                            node: node_id,
                            message: e.to_string(),
                        },
                    );
                }
            };

            let edge = match graph.edge(&node_id) {
                Some(edge) => edge,
                None => break fail(state, RunError::NoEdgeDefined(node_id)),
            };
            let resolution = edge.resolve(&state);
            let next = resolution.target.to_string();
            if edge.is_conditional() {
                let decision = RouteDecision {
                    round: state.round(),
                    from: node_id,
                    to: next.clone(),
                    route: resolution.route,
                };
                log::debug!("Routing: {}", decision);
                state.push_route(decision);
            }

            if next == END {
                state.push_log(END_REACHED);
                log::info!("Graph '{}' reached END", graph.name());
                break RunOutcome::Completed(state);
            }

            state.advance(&next);
            observer.on_round(&state).await;
        };

        observer.on_finish(&outcome).await;
        outcome
    }
}

fn fail(mut state: WorkflowState, error: RunError) -> RunOutcome {
    log::error!("Run failed: {}", error);
    state.push_log(error.to_string());
    RunOutcome::Failed { error, state }
}
