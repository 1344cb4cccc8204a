//! The TaskFlow worker: dequeues tasks, runs them through an injected
//! processor, persists the outcome, and wires the event bus's retry and
//! dependency handlers back into the queue.

mod processor;
mod requeue;
mod worker;

pub use processor::TaskProcessor;
pub use requeue::register_requeue_on_task_created;
pub use worker::Worker;
