use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::bus::EventBus;
use crate::event::EventKind;

fn as_u32(payload: &HashMap<String, Value>, key: &str, default: u32) -> u32 {
    payload
        .get(key)
        .and_then(Value::as_u64)
        .map(|v| v as u32)
        .unwrap_or(default)
}

fn as_str<'a>(payload: &'a HashMap<String, Value>, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(Value::as_str)
}

/// Subscribes a retry handler: on `TaskFailed`, re-publishes a `TaskCreated`
/// event with an incremented retry counter if the task hasn't exhausted
/// `max_retries`, otherwise logs that the task is being abandoned.
pub fn register_retry_handler(bus: Arc<EventBus>) {
    bus.subscribe(EventKind::TaskFailed, move |event| {
        let payload = &event.payload;
        let task_id = as_str(payload, "task_id").unwrap_or("unknown").to_string();
        let retry_count = as_u32(payload, "retry_count", 0);
        let max_retries = as_u32(payload, "max_retries", 3);

        if retry_count < max_retries {
            let new_retry_count = retry_count + 1;
            tracing::info!(
                event = "taskflow.eventbus.retry",
                task_id,
                attempt = new_retry_count,
                max_retries,
                "retry initiated"
            );

            let mut new_payload = HashMap::new();
            new_payload.insert("task_id".to_string(), json!(task_id));
            if let Some(name) = as_str(payload, "name") {
                new_payload.insert("name".to_string(), json!(name));
            }
            if let Some(priority) = payload.get("priority") {
                new_payload.insert("priority".to_string(), priority.clone());
            }
            if let Some(inner) = payload.get("payload") {
                new_payload.insert("payload".to_string(), inner.clone());
            }
            new_payload.insert("retry_count".to_string(), json!(new_retry_count));
            new_payload.insert("max_retries".to_string(), json!(max_retries));
            if let Some(error_message) = as_str(payload, "error_message") {
                new_payload.insert("original_failure".to_string(), json!(error_message));
            }

            bus.publish(
                EventKind::TaskCreated,
                new_payload,
                "retry_handler",
                event.correlation_id.clone(),
            );
        } else {
            tracing::error!(
                event = "taskflow.eventbus.retry_exhausted",
                task_id,
                max_retries,
                "task reached max retries, abandoning"
            );
        }
    });
}

/// Subscribes a dependency handler: on `TaskCompleted` for a task whose
/// `task_type` is `data_processing`, publishes a follow-up `report_generation`
/// task to run against the completed task's output.
pub fn register_dependency_handler(bus: Arc<EventBus>) {
    bus.subscribe(EventKind::TaskCompleted, move |event| {
        let payload = &event.payload;
        if as_str(payload, "task_type") != Some("data_processing") {
            return;
        }

        let task_id = as_str(payload, "task_id").unwrap_or("unknown").to_string();
        let mut new_payload = HashMap::new();
        new_payload.insert("name".to_string(), json!(format!("Report for task {task_id}")));
        new_payload.insert("task_type".to_string(), json!("report_generation"));
        new_payload.insert("priority".to_string(), json!(3));
        new_payload.insert("parent_task_id".to_string(), json!(task_id));

        bus.publish(
            EventKind::TaskCreated,
            new_payload,
            "dependency_handler",
            event.correlation_id.clone(),
        );
        tracing::info!(event = "taskflow.eventbus.dependency_triggered", parent_task_id = task_id, "dependent report task published");
    });
}

/// Subscribes a system handler: on `SystemHealthCheck`, logs a warning
/// listing any service reported unhealthy in the event payload.
pub fn register_health_check_handler(bus: Arc<EventBus>) {
    bus.subscribe(EventKind::SystemHealthCheck, move |event| {
        let unhealthy: Vec<&str> = event
            .payload
            .iter()
            .filter_map(|(service, health)| {
                let healthy = health.get("healthy").and_then(Value::as_bool).unwrap_or(true);
                (!healthy).then_some(service.as_str())
            })
            .collect();

        if !unhealthy.is_empty() {
            tracing::warn!(event = "taskflow.eventbus.unhealthy_services", ?unhealthy, "unhealthy services detected");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn retry_handler_requeues_task_below_max_retries() {
        let bus = Arc::new(EventBus::new());
        register_retry_handler(bus.clone());

        let mut payload = HashMap::new();
        payload.insert("task_id".to_string(), json!("t-1"));
        payload.insert("retry_count".to_string(), json!(1));
        payload.insert("max_retries".to_string(), json!(3));
        bus.publish(EventKind::TaskFailed, payload, "worker", None);

        std::thread::sleep(Duration::from_millis(50));
        let created = bus.get_events(Some(EventKind::TaskCreated), None, 10);
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].payload.get("retry_count"), Some(&json!(2)));
    }

    #[test]
    fn retry_handler_abandons_task_at_max_retries() {
        let bus = Arc::new(EventBus::new());
        register_retry_handler(bus.clone());

        let mut payload = HashMap::new();
        payload.insert("task_id".to_string(), json!("t-2"));
        payload.insert("retry_count".to_string(), json!(3));
        payload.insert("max_retries".to_string(), json!(3));
        bus.publish(EventKind::TaskFailed, payload, "worker", None);

        std::thread::sleep(Duration::from_millis(50));
        let created = bus.get_events(Some(EventKind::TaskCreated), None, 10);
        assert!(created.is_empty());
    }

    #[test]
    fn dependency_handler_triggers_report_task_for_data_processing() {
        let bus = Arc::new(EventBus::new());
        register_dependency_handler(bus.clone());

        let mut payload = HashMap::new();
        payload.insert("task_id".to_string(), json!("t-3"));
        payload.insert("task_type".to_string(), json!("data_processing"));
        bus.publish(EventKind::TaskCompleted, payload, "worker", None);

        std::thread::sleep(Duration::from_millis(50));
        let created = bus.get_events(Some(EventKind::TaskCreated), None, 10);
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].payload.get("task_type"), Some(&json!("report_generation")));
    }

    #[test]
    fn dependency_handler_ignores_other_task_types() {
        let bus = Arc::new(EventBus::new());
        register_dependency_handler(bus.clone());

        let mut payload = HashMap::new();
        payload.insert("task_id".to_string(), json!("t-4"));
        payload.insert("task_type".to_string(), json!("report_generation"));
        bus.publish(EventKind::TaskCompleted, payload, "worker", None);

        std::thread::sleep(Duration::from_millis(50));
        let created = bus.get_events(Some(EventKind::TaskCreated), None, 10);
        assert!(created.is_empty());
    }
}
