// SPDX-License-Identifier: MIT

//! Submission queue and the worker pool that drains it

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use super::store::RunStore;
use crate::engine::error::{EngineError, RunError};
use crate::workflow::graph::{Executor, GraphDefinition, RunObserver, RunOutcome};
use crate::workflow::state::WorkflowState;

/// One queued run
pub struct RunJob {
    pub run_id: String,
    pub graph: Arc<GraphDefinition>,
    pub state: WorkflowState,
    pub max_rounds: u32,
    pub cancel: CancellationToken,
}

/// Fixed set of tasks pulling jobs off one unbounded queue
pub struct WorkerPool {
    sender: mpsc::UnboundedSender<RunJob>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` tasks. Must be called inside a tokio runtime.
    pub fn start(workers: usize, runs: RunStore) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel::<RunJob>();
        let receiver = Arc::new(Mutex::new(receiver));

        let handles = (0..workers.max(1))
            .map(|worker_id| {
                let receiver = receiver.clone();
                let runs = runs.clone();
                tokio::spawn(async move {
                    log::debug!("Worker {} started", worker_id);
                    loop {
                        let job = {
                            let mut receiver = receiver.lock().await;
                            receiver.recv().await
                        };
                        let Some(job) = job else { break };
                        let run_id = job.run_id.clone();
                        // Own task per run so a panic cannot take the worker down
                        if let Err(e) = tokio::spawn(execute(worker_id, job, runs.clone())).await {
                            abandon(&runs, &run_id, e).await;
                        }
                    }
                    log::debug!("Worker {} stopped", worker_id);
                })
            })
            .collect();

        log::info!("Started worker pool with {} workers", workers.max(1));
        Self { sender, handles }
    }

    /// Enqueue a job without waiting for it to run
    pub fn submit(&self, job: RunJob) -> Result<(), EngineError> {
        let run_id = job.run_id.clone();
        self.sender
            .send(job)
            .map_err(|_| EngineError::config(format!("worker pool is shut down, run {} dropped", run_id)))
    }

    /// Close the queue and wait for in-flight runs to finish
    pub async fn shutdown(self) {
        drop(self.sender);
        for handle in self.handles {
            if let Err(e) = handle.await {
                log::error!("Worker task failed: {}", e);
            }
        }
    }
}

async fn execute(worker_id: usize, job: RunJob, runs: RunStore) {
    log::info!("Worker {} picked up run {}", worker_id, job.run_id);
    let writer = RecordWriter {
        run_id: job.run_id.clone(),
        runs: runs.clone(),
    };
    Executor::new(job.max_rounds)
        .run_observed(&job.graph, job.state, &writer, &job.cancel)
        .await;
    runs.release(&job.run_id).await;
}

/// Close out a run whose task ended without reporting an outcome
async fn abandon(runs: &RunStore, run_id: &str, error: JoinError) {
    let reason = if error.is_panic() {
        "worker task panicked"
    } else {
        "worker task cancelled"
    };
    log::error!("Run {} abandoned: {}", run_id, reason);
    runs.update(run_id, |record| {
        record.abort(RunError::Aborted(reason.to_string()))
    })
    .await;
    runs.release(run_id).await;
}

/// Mirrors executor progress into the run record it owns
struct RecordWriter {
    run_id: String,
    runs: RunStore,
}

#[async_trait]
impl RunObserver for RecordWriter {
    async fn on_start(&self, state: &WorkflowState) {
        self.runs
            .update(&self.run_id, |record| record.mark_running(state))
            .await;
    }

    async fn on_round(&self, state: &WorkflowState) {
        self.runs
            .update(&self.run_id, |record| record.record_progress(state))
            .await;
    }

    async fn on_finish(&self, outcome: &RunOutcome) {
        self.runs
            .update(&self.run_id, |record| record.finish(outcome))
            .await;
        match outcome.error() {
            None => log::info!("Run {} completed", self.run_id),
            Some(e) => log::warn!("Run {} failed: {}", self.run_id, e),
        }
    }
}
