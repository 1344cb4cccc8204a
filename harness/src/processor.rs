use std::thread;
use std::time::Duration;

use rand::Rng;
use taskflow_core::Task;

/// Default task processor: simulates a small amount of work and fails a
/// small fraction of the time, so the retry and event-bus machinery has
/// something to exercise without a real downstream integration wired in.
pub fn simple_task_processor(task: &Task) -> bool {
    tracing::info!(event = "taskflow.processor.start", task_id = %task.id, name = %task.name, "processing task");
    thread::sleep(Duration::from_millis(100));

    let fails = rand::thread_rng().gen_bool(0.1);
    if fails {
        tracing::error!(event = "taskflow.processor.failed", task_id = %task.id, "task failed during processing");
        return false;
    }

    tracing::info!(event = "taskflow.processor.completed", task_id = %task.id, "task completed successfully");
    true
}
