// SPDX-License-Identifier: MIT

use crate::engine::error::StepError;
use crate::engine::step::{FnStep, Predicate, Step};
use crate::workflow::state::WorkflowState;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Name -> implementation lookup for steps and named predicates.
///
/// Graphs resolve names once, when they are built. Re-registering a name
/// afterwards only affects graphs built later.
#[derive(Clone)]
pub struct StepRegistry {
    steps: Arc<RwLock<HashMap<String, Arc<dyn Step>>>>,
    predicates: Arc<RwLock<HashMap<String, Arc<dyn Predicate>>>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self {
            steps: Arc::new(RwLock::new(HashMap::new())),
            predicates: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register(&self, step: Arc<dyn Step>) {
        let mut steps = self.steps.write().await;
        if steps.insert(step.name().to_string(), step.clone()).is_some() {
            log::warn!("Step '{}' re-registered, replacing previous", step.name());
        }
    }

    /// Register a synchronous closure as a step
    pub async fn register_fn<F>(&self, name: &str, func: F)
    where
        F: Fn(WorkflowState) -> Result<WorkflowState, StepError> + Send + Sync + 'static,
    {
        self.register(Arc::new(FnStep::new(name, func))).await;
    }

    pub async fn register_predicate<P>(&self, name: &str, predicate: P)
    where
        P: Predicate + 'static,
    {
        let mut predicates = self.predicates.write().await;
        if predicates.insert(name.to_string(), Arc::new(predicate)).is_some() {
            log::warn!("Predicate '{}' re-registered, replacing previous", name);
        }
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Step>> {
        let steps = self.steps.read().await;
        steps.get(name).cloned()
    }

    pub async fn get_predicate(&self, name: &str) -> Option<Arc<dyn Predicate>> {
        let predicates = self.predicates.read().await;
        predicates.get(name).cloned()
    }

    /// Registered step names, sorted
    pub async fn step_names(&self) -> Vec<String> {
        let steps = self.steps.read().await;
        let mut names: Vec<String> = steps.keys().cloned().collect();
        names.sort();
        names
    }

    /// Registered predicate names, sorted
    pub async fn predicate_names(&self) -> Vec<String> {
        let predicates = self.predicates.read().await;
        let mut names: Vec<String> = predicates.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::new()
    }
}
