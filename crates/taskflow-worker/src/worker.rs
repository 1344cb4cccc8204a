use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde_json::json;
use taskflow_core::{QueueBackend, StorageBackend, TaskStatus};
use taskflow_eventbus::{EventBus, EventKind};

use crate::processor::TaskProcessor;

const DEFAULT_DEQUEUE_TIMEOUT: Duration = Duration::from_secs(1);

/// Pulls tasks off a `QueueBackend`, runs them through a `TaskProcessor`,
/// persists the outcome, and publishes a completion event. Runs on a single
/// dedicated OS thread, matching the blocking monitor the queue backend
/// exposes.
pub struct Worker {
    queue: Arc<dyn QueueBackend>,
    storage: Arc<dyn StorageBackend>,
    processor: Arc<dyn TaskProcessor>,
    event_bus: Option<Arc<EventBus>>,
    dequeue_timeout: Duration,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    pub fn new(
        queue: Arc<dyn QueueBackend>,
        storage: Arc<dyn StorageBackend>,
        processor: Arc<dyn TaskProcessor>,
    ) -> Self {
        Self {
            queue,
            storage,
            processor,
            event_bus: None,
            dequeue_timeout: DEFAULT_DEQUEUE_TIMEOUT,
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn with_dequeue_timeout(mut self, timeout: Duration) -> Self {
        self.dequeue_timeout = timeout;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Starts the worker thread. A no-op if already running.
    pub fn start(self: &Arc<Self>) {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let worker = self.clone();
        let handle = thread::Builder::new()
            .name("taskflow-worker".to_string())
            .spawn(move || worker.run_loop())
            .expect("failed to spawn worker thread");

        *self.handle.lock().expect("worker handle lock poisoned") = Some(handle);
        tracing::info!(event = "taskflow.worker.started", "worker thread started");
    }

    /// Signals the loop to stop and joins the thread. Idempotent.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().expect("worker handle lock poisoned").take() {
            let _ = handle.join();
            tracing::info!(event = "taskflow.worker.stopped", "worker thread stopped");
        }
    }

    fn run_loop(&self) {
        while self.running.load(Ordering::SeqCst) {
            match self.queue.dequeue(Some(self.dequeue_timeout)) {
                Ok(Some(task)) => self.handle_task(task),
                Ok(None) => continue,
                Err(err) => {
                    tracing::error!(event = "taskflow.worker.dequeue_error", error = %err, "error dequeuing task");
                }
            }
        }
    }

    fn handle_task(&self, mut task: taskflow_core::Task) {
        let success = panic::catch_unwind(AssertUnwindSafe(|| self.processor.process(&task)))
            .unwrap_or(false);

        let final_status = if success {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };

        if let Err(err) = task.transition_to(final_status) {
            tracing::error!(event = "taskflow.worker.transition_error", task_id = %task.id, error = %err, "failed to transition task status");
            return;
        }

        if success {
            tracing::info!(event = "taskflow.worker.task_completed", task_id = %task.id, "task completed successfully");
        } else {
            tracing::error!(event = "taskflow.worker.task_failed", task_id = %task.id, "task failed during processing");
        }

        if let Err(err) = self.storage.save_task(&task) {
            tracing::error!(event = "taskflow.worker.persist_error", task_id = %task.id, error = %err, "failed to persist task");
        }

        // Always ack after the durable write regardless of outcome; a failed
        // task's redelivery is the event bus retry handler's job, not the
        // queue backend's.
        if let Err(err) = self.queue.update_task_status(task.id, final_status) {
            tracing::error!(event = "taskflow.worker.ack_error", task_id = %task.id, error = %err, "failed to ack task status in queue");
        }

        if let Some(bus) = &self.event_bus {
            let kind = if success {
                EventKind::TaskCompleted
            } else {
                EventKind::TaskFailed
            };
            let mut payload: HashMap<String, serde_json::Value> = HashMap::new();
            payload.insert("task_id".to_string(), json!(task.id));
            payload.insert("name".to_string(), json!(task.name));
            payload.insert("priority".to_string(), json!(task.priority));
            payload.insert("payload".to_string(), json!(task.payload));
            payload.insert("retry_count".to_string(), json!(task.retry_count.unwrap_or(0)));
            payload.insert("max_retries".to_string(), json!(task.max_retries.unwrap_or(3)));
            if let Some(error_message) = &task.error_message {
                payload.insert("error_message".to_string(), json!(error_message));
            }
            bus.publish(kind, payload, "worker", None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration as StdDuration;
    use taskflow_queue::InMemoryQueue;
    use taskflow_storage::LocalFsStorage;

    fn queue_and_storage() -> (Arc<InMemoryQueue>, Arc<LocalFsStorage>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(LocalFsStorage::new(dir.path()).unwrap());
        (Arc::new(InMemoryQueue::new()), storage, dir)
    }

    #[test]
    fn successful_task_is_persisted_as_completed() {
        let (queue, storage, _dir) = queue_and_storage();
        let id = queue.enqueue("A".into(), 1, HashMap::new(), None, None).unwrap();

        let processor: Arc<dyn TaskProcessor> = Arc::new(|_task: &taskflow_core::Task| true);
        let worker = Arc::new(Worker::new(queue.clone(), storage.clone(), processor));
        worker.start();

        let task = wait_for_terminal(&storage, id);
        worker.stop();
        assert_eq!(task.status, TaskStatus::Completed);
    }

    #[test]
    fn failing_task_is_persisted_as_failed() {
        let (queue, storage, _dir) = queue_and_storage();
        let id = queue.enqueue("A".into(), 1, HashMap::new(), None, None).unwrap();

        let processor: Arc<dyn TaskProcessor> = Arc::new(|_task: &taskflow_core::Task| false);
        let worker = Arc::new(Worker::new(queue.clone(), storage.clone(), processor));
        worker.start();

        let task = wait_for_terminal(&storage, id);
        worker.stop();
        assert_eq!(task.status, TaskStatus::Failed);
    }

    #[test]
    fn panicking_processor_is_treated_as_failure_not_a_crash() {
        let (queue, storage, _dir) = queue_and_storage();
        let id = queue.enqueue("A".into(), 1, HashMap::new(), None, None).unwrap();

        let processor: Arc<dyn TaskProcessor> =
            Arc::new(|_task: &taskflow_core::Task| panic!("boom"));
        let worker = Arc::new(Worker::new(queue.clone(), storage.clone(), processor));
        worker.start();

        let task = wait_for_terminal(&storage, id);
        worker.stop();
        assert_eq!(task.status, TaskStatus::Failed);
    }

    #[test]
    fn publishes_completion_event_on_success() {
        let (queue, storage, _dir) = queue_and_storage();
        let bus = Arc::new(EventBus::new());
        let processed = Arc::new(AtomicUsize::new(0));
        let processed2 = processed.clone();
        bus.subscribe(EventKind::TaskCompleted, move |_event| {
            processed2.fetch_add(1, Ordering::SeqCst);
        });

        queue.enqueue("A".into(), 1, HashMap::new(), None, None).unwrap();
        let processor: Arc<dyn TaskProcessor> = Arc::new(|_task: &taskflow_core::Task| true);
        let worker = Arc::new(
            Worker::new(queue, storage, processor)
                .with_event_bus(bus)
                .with_dequeue_timeout(StdDuration::from_millis(50)),
        );
        worker.start();
        thread::sleep(StdDuration::from_millis(200));
        worker.stop();

        assert_eq!(processed.load(Ordering::SeqCst), 1);
    }

    fn wait_for_terminal(storage: &Arc<LocalFsStorage>, id: uuid::Uuid) -> taskflow_core::Task {
        for _ in 0..50 {
            if let Some(task) = storage.load_task(id).unwrap() {
                return task;
            }
            thread::sleep(StdDuration::from_millis(20));
        }
        panic!("task {id} was never persisted");
    }
}
