use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Context;
use taskflow_api::{build_router, AppState};
use taskflow_eventbus::EventBus;
use taskflow_worker::{register_requeue_on_task_created, Worker};

use crate::config::TaskFlowConfig;
use crate::{backends, processor};

/// Runs the HTTP API in-process alongside its own worker thread and event
/// bus wiring, the same single-process shape the original API server used
/// (`lifespan` starting the worker on app startup).
pub async fn run(cfg: &TaskFlowConfig) -> anyhow::Result<()> {
    let queue = backends::build_queue(cfg)?;
    let storage = backends::build_storage(cfg)?;
    let event_bus = Arc::new(EventBus::new());

    taskflow_eventbus::register_retry_handler(event_bus.clone());
    taskflow_eventbus::register_dependency_handler(event_bus.clone());
    taskflow_eventbus::register_health_check_handler(event_bus.clone());
    register_requeue_on_task_created(queue.clone(), event_bus.clone());

    let worker = Arc::new(
        Worker::new(queue.clone(), storage.clone(), Arc::new(processor::simple_task_processor))
            .with_event_bus(event_bus.clone())
            .with_dequeue_timeout(std::time::Duration::from_millis(cfg.worker_poll_timeout_ms)),
    );
    worker.start();

    let worker_running = Arc::new(AtomicBool::new(true));
    let state = Arc::new(AppState {
        queue,
        storage,
        event_bus,
        worker_running: worker_running.clone(),
    });
    let app = build_router(state);

    let addr: std::net::SocketAddr = cfg
        .api_bind
        .parse()
        .with_context(|| format!("parse TASKFLOW_API_BIND={}", cfg.api_bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind api to {addr}"))?;
    tracing::info!(event = "taskflow.api.started", addr = %addr, "api server listening");

    tokio::select! {
        res = axum::serve(listener, app.into_make_service()) => {
            res.context("api serve")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(event = "taskflow.api.shutdown", "api shutting down");
        }
    }

    worker_running.store(false, std::sync::atomic::Ordering::SeqCst);
    worker.stop();
    Ok(())
}
