use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use taskflow_core::QueueBackend;
use taskflow_eventbus::{EventBus, EventKind};

/// Closes the loop the retry and dependency handlers open: both publish a
/// `TaskCreated` event describing a task that doesn't exist in the queue
/// yet (a redelivery or a follow-up task), and this subscription is what
/// actually turns that event into a new enqueued task.
pub fn register_requeue_on_task_created(queue: Arc<dyn QueueBackend>, bus: Arc<EventBus>) {
    bus.subscribe(EventKind::TaskCreated, move |event| {
        if event.source != "retry_handler" && event.source != "dependency_handler" {
            return;
        }

        let payload = &event.payload;
        let name = payload
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("unnamed")
            .to_string();
        let priority = payload
            .get("priority")
            .and_then(Value::as_i64)
            .map(|p| p as i32)
            .unwrap_or(3);
        let inner_payload: HashMap<String, Value> = payload
            .get("payload")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        // Carries both counters forward: `max_retries` so the bound stays the
        // same across re-enqueues, `retry_count` so the bound is actually
        // reachable (each retry is a brand-new task, not a mutation of the
        // original).
        let retry_count = payload.get("retry_count").and_then(Value::as_u64).map(|v| v as u32);
        let max_retries = payload.get("max_retries").and_then(Value::as_u64).map(|v| v as u32);

        match queue.enqueue(name, priority, inner_payload, retry_count, max_retries) {
            Ok(id) => {
                tracing::info!(event = "taskflow.worker.requeued", task_id = %id, source = %event.source, "re-enqueued task from event");
            }
            Err(err) => {
                tracing::error!(event = "taskflow.worker.requeue_error", error = %err, source = %event.source, "failed to re-enqueue task from event");
            }
        }
    });
}
