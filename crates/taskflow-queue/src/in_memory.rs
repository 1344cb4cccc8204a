use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use serde_json::Value;
use taskflow_core::{QueueBackend, Result, Task, TaskStatus};
use uuid::Uuid;

/// `(priority, insertion_sequence, id)`. `Reverse` makes the `BinaryHeap`
/// (normally a max-heap) pop the lowest `(priority, seq)` pair first, which
/// is exactly the ordering law: lower priority number wins, FIFO within a
/// priority class.
type HeapKey = Reverse<(i32, u64, Uuid)>;

struct QueueState {
    heap: BinaryHeap<HeapKey>,
    tasks: HashMap<Uuid, Task>,
    next_seq: u64,
}

/// In-memory priority queue: a min-heap plus a status index guarded by one
/// monitor (mutex + condition variable). Does not persist ordering across
/// restarts.
pub struct InMemoryQueue {
    state: Mutex<QueueState>,
    not_empty: Condvar,
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                tasks: HashMap::new(),
                next_seq: 0,
            }),
            not_empty: Condvar::new(),
        }
    }

    /// Pop the next heap entry whose task is still `pending`, discarding any
    /// stale entries left behind by `delete_task` or an intervening status
    /// change (the heap never needs an O(n) scan to remove them).
    fn pop_pending(state: &mut QueueState) -> Option<Task> {
        while let Some(Reverse((_, _, id))) = state.heap.pop() {
            if let Some(task) = state.tasks.get(&id) {
                if task.status == TaskStatus::Pending {
                    let task = state.tasks.get_mut(&id).expect("checked above");
                    task.transition_to(TaskStatus::Processing)
                        .expect("pending -> processing is always legal");
                    return Some(task.clone());
                }
            }
        }
        None
    }
}

impl QueueBackend for InMemoryQueue {
    fn enqueue(
        &self,
        name: String,
        priority: i32,
        payload: HashMap<String, Value>,
        retry_count: Option<u32>,
        max_retries: Option<u32>,
    ) -> Result<Uuid> {
        let task = Task::new(name, priority, payload, retry_count, max_retries)?;
        let id = task.id;

        let mut state = self.state.lock().expect("queue monitor poisoned");
        let seq = state.next_seq;
        state.next_seq += 1;
        state.heap.push(Reverse((priority, seq, id)));
        state.tasks.insert(id, task);
        drop(state);
        self.not_empty.notify_one();

        tracing::info!(event = "taskflow.queue.enqueue", task_id = %id, priority, "task enqueued");
        Ok(id)
    }

    fn dequeue(&self, timeout: Option<Duration>) -> Result<Option<Task>> {
        let deadline = timeout.map(|d| Instant::now() + d);
        let mut state = self.state.lock().expect("queue monitor poisoned");

        loop {
            if let Some(task) = Self::pop_pending(&mut state) {
                tracing::info!(event = "taskflow.queue.dequeue", task_id = %task.id, "task dequeued");
                return Ok(Some(task));
            }

            match deadline {
                None => {
                    state = self
                        .not_empty
                        .wait(state)
                        .expect("queue monitor poisoned");
                }
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Ok(None);
                    }
                    let (next_state, timeout_result) = self
                        .not_empty
                        .wait_timeout(state, remaining)
                        .expect("queue monitor poisoned");
                    state = next_state;
                    if timeout_result.timed_out() && state.heap.is_empty() {
                        return Ok(None);
                    }
                }
            }
        }
    }

    fn get_task(&self, id: Uuid) -> Result<Option<Task>> {
        let state = self.state.lock().expect("queue monitor poisoned");
        Ok(state.tasks.get(&id).cloned())
    }

    fn get_all_tasks(&self) -> Result<Vec<Task>> {
        let state = self.state.lock().expect("queue monitor poisoned");
        Ok(state.tasks.values().cloned().collect())
    }

    fn get_tasks_by_status(&self, status: TaskStatus) -> Result<Vec<Task>> {
        let state = self.state.lock().expect("queue monitor poisoned");
        Ok(state
            .tasks
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect())
    }

    fn update_task_status(&self, id: Uuid, status: TaskStatus) -> Result<bool> {
        let mut state = self.state.lock().expect("queue monitor poisoned");
        let Some(task) = state.tasks.get_mut(&id) else {
            return Ok(false);
        };

        if task.status == status {
            return Ok(true);
        }
        if task.transition_to(status).is_err() {
            return Ok(false);
        }

        if status == TaskStatus::Pending {
            let seq = state.next_seq;
            state.next_seq += 1;
            let priority = state.tasks.get(&id).expect("just updated").priority;
            state.heap.push(Reverse((priority, seq, id)));
            drop(state);
            self.not_empty.notify_one();
            tracing::info!(event = "taskflow.queue.requeue", task_id = %id, "task requeued");
            return Ok(true);
        }

        Ok(true)
    }

    fn delete_task(&self, id: Uuid) -> Result<bool> {
        let mut state = self.state.lock().expect("queue monitor poisoned");
        let existed = state.tasks.remove(&id).is_some();
        Ok(existed)
    }

    fn size(&self) -> Result<usize> {
        let state = self.state.lock().expect("queue monitor poisoned");
        Ok(state
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn payload() -> HashMap<String, Value> {
        HashMap::new()
    }

    #[test]
    fn priority_order_scenario_1() {
        let q = InMemoryQueue::new();
        q.enqueue("A".into(), 3, payload(), None, None).unwrap();
        q.enqueue("B".into(), 1, payload(), None, None).unwrap();
        q.enqueue("C".into(), 2, payload(), None, None).unwrap();

        let t1 = q.dequeue(Some(Duration::from_millis(10))).unwrap().unwrap();
        let t2 = q.dequeue(Some(Duration::from_millis(10))).unwrap().unwrap();
        let t3 = q.dequeue(Some(Duration::from_millis(10))).unwrap().unwrap();

        assert_eq!((t1.name.as_str(), t2.name.as_str(), t3.name.as_str()), ("B", "C", "A"));
    }

    #[test]
    fn fifo_tiebreak_scenario_2() {
        let q = InMemoryQueue::new();
        q.enqueue("A".into(), 2, payload(), None, None).unwrap();
        q.enqueue("B".into(), 2, payload(), None, None).unwrap();

        let t1 = q.dequeue(Some(Duration::from_millis(10))).unwrap().unwrap();
        let t2 = q.dequeue(Some(Duration::from_millis(10))).unwrap().unwrap();
        assert_eq!((t1.name.as_str(), t2.name.as_str()), ("A", "B"));
    }

    #[test]
    fn dequeue_times_out_on_empty_queue() {
        let q = InMemoryQueue::new();
        let result = q.dequeue(Some(Duration::from_millis(20))).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn dequeue_blocks_until_enqueue_wakes_it() {
        let q = Arc::new(InMemoryQueue::new());
        let q2 = q.clone();
        let handle = thread::spawn(move || q2.dequeue(None).unwrap());

        thread::sleep(Duration::from_millis(20));
        q.enqueue("late".into(), 1, payload(), None, None).unwrap();

        let task = handle.join().unwrap().unwrap();
        assert_eq!(task.name, "late");
    }

    #[test]
    fn no_loss_until_delete() {
        let q = InMemoryQueue::new();
        let id = q.enqueue("A".into(), 1, payload(), None, None).unwrap();
        assert!(q.get_task(id).unwrap().is_some());
        assert!(q.delete_task(id).unwrap());
        assert!(q.get_task(id).unwrap().is_none());
    }

    #[test]
    fn delete_before_dequeue_leaves_queue_empty() {
        let q = InMemoryQueue::new();
        let id = q.enqueue("A".into(), 1, payload(), None, None).unwrap();
        assert!(q.delete_task(id).unwrap());
        assert_eq!(q.size().unwrap(), 0);
        assert!(q.dequeue(Some(Duration::from_millis(10))).unwrap().is_none());
    }

    #[test]
    fn retry_requeues_and_redelivers() {
        let q = InMemoryQueue::new();
        let id = q.enqueue("A".into(), 1, payload(), None, None).unwrap();
        let task = q.dequeue(Some(Duration::from_millis(10))).unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Processing);

        assert!(q.update_task_status(id, TaskStatus::Failed).unwrap());
        assert!(q.update_task_status(id, TaskStatus::Pending).unwrap());

        let redelivered = q.dequeue(Some(Duration::from_millis(10))).unwrap().unwrap();
        assert_eq!(redelivered.id, id);
        assert_eq!(redelivered.status, TaskStatus::Processing);
    }

    #[test]
    fn concurrent_dequeuers_each_get_exactly_one_task() {
        let q = Arc::new(InMemoryQueue::new());
        for i in 0..50 {
            q.enqueue(format!("t{i}"), 1, payload(), None, None).unwrap();
        }

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let q = q.clone();
                thread::spawn(move || {
                    let mut ids = Vec::new();
                    while let Some(task) = q.dequeue(Some(Duration::from_millis(50))).unwrap() {
                        ids.push(task.id);
                    }
                    ids
                })
            })
            .collect();

        let mut seen = std::collections::HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(seen.insert(id), "task {id} delivered more than once");
            }
        }
        assert_eq!(seen.len(), 50);
    }
}
