use std::sync::Arc;

use crate::engine::assignment::{Orchestrator, OrchestratorSettings};
use crate::llm::LlmBackend;
use crate::observability::metrics::Metrics;
use crate::store::Store;

pub struct AppState {
    pub store: Arc<Store>,
    pub backend: Arc<dyn LlmBackend>,
    pub orchestrator: Arc<Orchestrator>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(backend: Arc<dyn LlmBackend>, settings: OrchestratorSettings) -> Self {
        let store = Arc::new(Store::new());
        let metrics = Metrics::new();
        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            backend.clone(),
            settings,
            metrics.clone(),
        ));

        Self {
            store,
            backend,
            orchestrator,
            metrics,
        }
    }
}
