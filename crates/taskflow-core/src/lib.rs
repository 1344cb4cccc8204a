//! Shared core abstractions for TaskFlow.
//!
//! This crate defines the cross-crate contracts consumed by the worker, the
//! API surface, and the harness: the task model, the queue backend
//! interface, and the storage interface. Implementations live in
//! `taskflow-queue` and `taskflow-storage`.

mod error;
mod task;

pub use error::{Error, Result};
pub use task::{
    validate_name, validate_priority, Task, TaskStatus, MAX_NAME_LEN, MAX_PRIORITY, MIN_NAME_LEN,
    MIN_PRIORITY,
};

use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Uniform contract implemented by both the in-memory queue and the remote
/// queue adapter (`taskflow-queue`). Blocking: the in-memory backend blocks
/// the calling thread on its condition variable; the remote backend blocks
/// on its long-poll network call.
pub trait QueueBackend: Send + Sync {
    /// Construct a new task and index it as `pending`. Never blocks.
    /// `max_retries` is the retry bound read by the worker on failure
    /// (`None` falls back to the worker's default of 3). `retry_count`
    /// seeds the task's starting attempt count; ordinary callers pass
    /// `None` (0) and only the retry-requeue path supplies a carried-over
    /// count so the bound is actually enforceable across a retry chain.
    fn enqueue(
        &self,
        name: String,
        priority: i32,
        payload: HashMap<String, Value>,
        retry_count: Option<u32>,
        max_retries: Option<u32>,
    ) -> Result<Uuid>;

    /// Return the lowest-priority-numbered pending task, breaking ties by
    /// insertion order, atomically transitioning it to `processing`. Blocks
    /// up to `timeout` (or indefinitely if `None`); returns `None` on
    /// timeout.
    fn dequeue(&self, timeout: Option<Duration>) -> Result<Option<Task>>;

    fn get_task(&self, id: Uuid) -> Result<Option<Task>>;
    fn get_all_tasks(&self) -> Result<Vec<Task>>;
    fn get_tasks_by_status(&self, status: TaskStatus) -> Result<Vec<Task>>;

    /// Idempotent with respect to equal status; respects the transition DAG.
    fn update_task_status(&self, id: Uuid, status: TaskStatus) -> Result<bool>;

    fn delete_task(&self, id: Uuid) -> Result<bool>;

    /// Approximate count of `pending` tasks.
    fn size(&self) -> Result<usize>;
}

/// Uniform contract implemented by the local filesystem and remote
/// object-store storage backends (`taskflow-storage`). Persists terminal
/// task state; consumed by the worker (after processing) and the API's
/// delete path.
pub trait StorageBackend: Send + Sync {
    /// Must be atomic and idempotent on `task.id`.
    fn save_task(&self, task: &Task) -> Result<bool>;
    fn load_task(&self, id: Uuid) -> Result<Option<Task>>;
    fn delete_task(&self, id: Uuid) -> Result<bool>;
    fn list_all_tasks(&self) -> Result<Vec<Uuid>>;
    /// Returns an opaque identifier for a point-in-time snapshot.
    fn backup_all_tasks(&self) -> Result<String>;
    /// Restores tasks from a prior backup handle; returns the number restored.
    fn restore_from_backup(&self, handle: &str) -> Result<usize>;
}
