//! Queue backend implementations for TaskFlow: an in-memory priority queue
//! and a remote (SQS-shaped) adapter, both behind `taskflow_core::QueueBackend`.

mod in_memory;
mod remote;

pub use in_memory::InMemoryQueue;
pub use remote::{
    FakeRemoteQueueTransport, HttpRemoteQueueTransport, RemoteMessage, RemoteQueueAdapter,
    RemoteQueueTransport,
};
