use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::EngineConfig;
use crate::engine::notify::{MemoryOutbox, Notifier};
use crate::engine::AssignmentEngine;
use crate::models::assignment::AssignmentEvent;
use crate::observability::metrics::Metrics;
use crate::store::MemoryStore;

pub struct AppState {
    pub store: Arc<MemoryStore>,
    pub outbox: Arc<MemoryOutbox>,
    pub engine: AssignmentEngine,
    pub assignment_events_tx: broadcast::Sender<AssignmentEvent>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(engine_config: EngineConfig, event_buffer_size: usize) -> Self {
        let (assignment_events_tx, _unused_rx) = broadcast::channel(event_buffer_size);
        let store = Arc::new(MemoryStore::new());
        let outbox = Arc::new(MemoryOutbox::new());
        let metrics = Metrics::new();

        let engine = AssignmentEngine::new(
            store.clone(),
            Notifier::new(outbox.clone(), metrics.clone()),
            engine_config,
            metrics.clone(),
            assignment_events_tx.clone(),
        );

        Self {
            store,
            outbox,
            engine,
            assignment_events_tx,
            metrics,
        }
    }
}
