use std::sync::Arc;
use std::time::Duration;

use taskflow_eventbus::EventBus;
use taskflow_worker::{register_requeue_on_task_created, Worker};

use crate::config::TaskFlowConfig;
use crate::{backends, processor};

/// Runs the worker as a standalone process, separate from the API server —
/// useful once task volume outgrows a single combined process.
pub async fn run(cfg: &TaskFlowConfig) -> anyhow::Result<()> {
    let queue = backends::build_queue(cfg)?;
    let storage = backends::build_storage(cfg)?;
    let event_bus = Arc::new(EventBus::new());

    taskflow_eventbus::register_retry_handler(event_bus.clone());
    taskflow_eventbus::register_dependency_handler(event_bus.clone());
    register_requeue_on_task_created(queue.clone(), event_bus.clone());

    let worker = Arc::new(
        Worker::new(queue, storage, Arc::new(processor::simple_task_processor))
            .with_event_bus(event_bus)
            .with_dequeue_timeout(Duration::from_millis(cfg.worker_poll_timeout_ms)),
    );
    worker.start();
    tracing::info!(event = "taskflow.worker.process_started", "standalone worker process started");

    tokio::signal::ctrl_c().await?;
    tracing::info!(event = "taskflow.worker.process_shutdown", "standalone worker process shutting down");
    worker.stop();
    Ok(())
}
