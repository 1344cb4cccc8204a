use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use taskflow_core::{QueueBackend, TaskStatus};
use taskflow_eventbus::EventBus;
use taskflow_queue::InMemoryQueue;
use taskflow_storage::LocalFsStorage;
use taskflow_worker::{register_requeue_on_task_created, Worker};

/// A task with `max_retries = 2` that always fails should be retried
/// exactly twice (three total attempts: the original plus two retries) and
/// then abandoned, with no further `TaskCreated` retry event published.
#[test]
fn task_is_abandoned_after_exactly_max_retries_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(LocalFsStorage::new(dir.path()).unwrap());
    let queue: Arc<InMemoryQueue> = Arc::new(InMemoryQueue::new());
    let bus = Arc::new(EventBus::new());

    taskflow_eventbus::register_retry_handler(bus.clone());
    register_requeue_on_task_created(queue.clone() as Arc<dyn QueueBackend>, bus.clone());

    let attempts = Arc::new(AtomicUsize::new(0));
    let attempts2 = attempts.clone();
    let processor: Arc<dyn taskflow_worker::TaskProcessor> =
        Arc::new(move |_task: &taskflow_core::Task| {
            attempts2.fetch_add(1, Ordering::SeqCst);
            false
        });

    let worker = Arc::new(
        Worker::new(
            queue.clone() as Arc<dyn QueueBackend>,
            storage.clone() as Arc<dyn taskflow_core::StorageBackend>,
            processor,
        )
        .with_event_bus(bus.clone())
        .with_dequeue_timeout(Duration::from_millis(30)),
    );

    queue
        .enqueue("flaky".into(), 3, HashMap::new(), None, Some(2))
        .unwrap();
    worker.start();

    // Each failure -> retry handler -> requeue takes a couple of dispatch
    // hops through background threads; poll instead of a fixed sleep.
    for _ in 0..100 {
        if attempts.load(Ordering::SeqCst) >= 3 {
            break;
        }
        thread::sleep(Duration::from_millis(20));
    }
    // Give the final retry-exhaustion path a moment to run (no further
    // enqueue should follow the third failure).
    thread::sleep(Duration::from_millis(150));
    worker.stop();

    assert_eq!(
        attempts.load(Ordering::SeqCst),
        3,
        "expected exactly 3 attempts (1 original + 2 retries)"
    );
    assert_eq!(
        queue.get_all_tasks().unwrap().len(),
        3,
        "original task plus exactly 2 retried tasks, no further retries"
    );
    assert!(queue
        .get_all_tasks()
        .unwrap()
        .iter()
        .all(|t| t.status == TaskStatus::Failed));
}
