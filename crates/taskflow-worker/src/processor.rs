use taskflow_core::Task;

/// Runs the actual work for a dequeued task. Returns `true` on success,
/// `false` on failure — the worker never treats a processor panic as a
/// crash, only as a failed task.
pub trait TaskProcessor: Send + Sync {
    fn process(&self, task: &Task) -> bool;
}

impl<F> TaskProcessor for F
where
    F: Fn(&Task) -> bool + Send + Sync,
{
    fn process(&self, task: &Task) -> bool {
        self(task)
    }
}
