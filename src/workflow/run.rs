// SPDX-License-Identifier: MIT

//! Run records - the externally visible result of one execution

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::error::RunError;
use crate::workflow::graph::RunOutcome;
use crate::workflow::state::WorkflowState;

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Pending => "PENDING",
            RunStatus::Running => "RUNNING",
            RunStatus::Completed => "COMPLETED",
            RunStatus::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

/// Status, trace and state of one run.
///
/// Only the executor driving the run writes to it; once the status is
/// terminal every further write is ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    pub run_id: String,
    pub graph_id: String,
    pub status: RunStatus,
    /// Latest snapshot; the final state once terminal
    pub state: WorkflowState,
    /// Failure message when `status` is FAILED
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    /// New PENDING record with a fresh run id
    pub fn pending(graph_id: impl Into<String>, state: WorkflowState) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            graph_id: graph_id.into(),
            status: RunStatus::Pending,
            state,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Full trace log
    pub fn log(&self) -> &[String] {
        self.state.logs()
    }

    pub fn mark_running(&mut self, state: &WorkflowState) -> bool {
        if self.status != RunStatus::Pending {
            log::warn!(
                "Run {} cannot start from status {}",
                self.run_id,
                self.status
            );
            return false;
        }
        self.status = RunStatus::Running;
        self.started_at = Some(Utc::now());
        self.state = state.clone();
        true
    }

    /// Replace the snapshot of a running run
    pub fn record_progress(&mut self, state: &WorkflowState) -> bool {
        if self.status != RunStatus::Running {
            log::warn!(
                "Ignoring progress for run {} in status {}",
                self.run_id,
                self.status
            );
            return false;
        }
        self.state = state.clone();
        true
    }

    /// Move to COMPLETED or FAILED from the outcome of the loop
    pub fn finish(&mut self, outcome: &RunOutcome) -> bool {
        if self.status.is_terminal() {
            log::warn!(
                "Run {} already finished as {}, ignoring outcome",
                self.run_id,
                self.status
            );
            return false;
        }
        self.status = outcome.status();
        self.state = outcome.state().clone();
        self.error = outcome.error().map(|e| e.to_string());
        self.finished_at = Some(Utc::now());
        true
    }

    /// Fail from the last recorded state, appending `error` to the trace
    pub fn abort(&mut self, error: RunError) -> bool {
        let mut state = self.state.clone();
        state.push_log(error.to_string());
        self.finish(&RunOutcome::Failed { error, state })
    }
}
