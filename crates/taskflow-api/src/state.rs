use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use taskflow_core::{QueueBackend, StorageBackend};
use taskflow_eventbus::EventBus;

/// Shared server state handed to every handler via `axum::extract::State`.
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<dyn QueueBackend>,
    pub storage: Arc<dyn StorageBackend>,
    pub event_bus: Arc<EventBus>,
    pub worker_running: Arc<AtomicBool>,
}
