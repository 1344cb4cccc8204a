use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use taskflow_core::{Error, QueueBackend, Result, Task, TaskStatus};
use uuid::Uuid;

/// A message received from a [`RemoteQueueTransport`]: an opaque body plus
/// the receipt handle required to acknowledge delivery.
#[derive(Debug, Clone)]
pub struct RemoteMessage {
    pub body: Value,
    pub receipt_handle: String,
}

/// The surface an external at-least-once messaging service (SQS-shaped)
/// must provide. `taskflow-queue` ships an HTTP-backed implementation and
/// an in-memory fake for tests; production deployments may swap in a
/// native SDK client behind this same trait.
pub trait RemoteQueueTransport: Send + Sync {
    fn send(&self, body: Value, attrs: HashMap<String, String>) -> Result<()>;
    fn receive(&self, max: usize, wait: Duration) -> Result<Vec<RemoteMessage>>;
    fn delete(&self, receipt_handle: &str) -> Result<()>;
    fn approximate_count(&self) -> Result<usize>;
}

/// Wire body for a task carried over the remote queue. Mirrors the
/// serialized task wire format; `receipt_handle` is never part of the body
/// since it's assigned per-delivery by the transport.
#[derive(Debug, Serialize, Deserialize)]
struct TaskMessageBody {
    id: Uuid,
    name: String,
    priority: i32,
    payload: HashMap<String, Value>,
    status: TaskStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    retry_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    max_retries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    error_message: Option<String>,
}

impl From<&Task> for TaskMessageBody {
    fn from(t: &Task) -> Self {
        Self {
            id: t.id,
            name: t.name.clone(),
            priority: t.priority,
            payload: t.payload.clone(),
            status: t.status,
            created_at: t.created_at,
            updated_at: t.updated_at,
            retry_count: t.retry_count,
            max_retries: t.max_retries,
            error_message: t.error_message.clone(),
        }
    }
}

/// Default long-poll wait when the worker requests an indefinite dequeue.
const DEFAULT_WAIT: Duration = Duration::from_secs(20);

/// Wraps an external queue service behind the `QueueBackend` contract.
///
/// Priority caveat: the external service does not guarantee priority
/// ordering. `priority` is carried as a message attribute only; delivery
/// order is whatever the transport provides (FIFO-ish for a typical queue
/// service). This is a documented limitation of the remote backend, not a
/// bug — only the in-memory backend honors the ordering law strictly.
pub struct RemoteQueueAdapter {
    transport: Box<dyn RemoteQueueTransport>,
    mirror: Mutex<HashMap<Uuid, Task>>,
}

impl RemoteQueueAdapter {
    pub fn new(transport: Box<dyn RemoteQueueTransport>) -> Self {
        Self {
            transport,
            mirror: Mutex::new(HashMap::new()),
        }
    }
}

impl QueueBackend for RemoteQueueAdapter {
    fn enqueue(
        &self,
        name: String,
        priority: i32,
        payload: HashMap<String, Value>,
        retry_count: Option<u32>,
        max_retries: Option<u32>,
    ) -> Result<Uuid> {
        let task = Task::new(name, priority, payload, retry_count, max_retries)?;
        let body = serde_json::to_value(TaskMessageBody::from(&task))
            .map_err(|e| Error::backend_unavailable(format!("encode task message: {e}")))?;
        let mut attrs = HashMap::new();
        attrs.insert("priority".to_string(), priority.to_string());

        self.transport.send(body, attrs)?;

        let id = task.id;
        self.mirror.lock().expect("mirror poisoned").insert(id, task);
        tracing::info!(event = "taskflow.remote_queue.enqueue", task_id = %id, priority, "task sent to remote queue");
        Ok(id)
    }

    fn dequeue(&self, timeout: Option<Duration>) -> Result<Option<Task>> {
        let wait = timeout.unwrap_or(DEFAULT_WAIT);
        let messages = match self.transport.receive(1, wait) {
            Ok(messages) => messages,
            Err(err) => {
                tracing::warn!(event = "taskflow.remote_queue.receive_error", error = %err, "remote dequeue failed; worker will retry");
                return Ok(None);
            }
        };

        let Some(message) = messages.into_iter().next() else {
            return Ok(None);
        };

        let body: TaskMessageBody = match serde_json::from_value(message.body) {
            Ok(body) => body,
            Err(err) => {
                tracing::warn!(event = "taskflow.remote_queue.parse_error", error = %err, "dropping unparseable message");
                return Ok(None);
            }
        };

        let mut task = Task {
            id: body.id,
            name: body.name,
            priority: body.priority,
            payload: body.payload,
            status: body.status,
            created_at: body.created_at,
            updated_at: body.updated_at,
            receipt_handle: Some(message.receipt_handle),
            retry_count: body.retry_count,
            max_retries: body.max_retries,
            error_message: body.error_message,
        };
        task.transition_to(TaskStatus::Processing)?;

        self.mirror
            .lock()
            .expect("mirror poisoned")
            .insert(task.id, task.clone());
        tracing::info!(event = "taskflow.remote_queue.dequeue", task_id = %task.id, "task received from remote queue");
        Ok(Some(task))
    }

    fn get_task(&self, id: Uuid) -> Result<Option<Task>> {
        Ok(self.mirror.lock().expect("mirror poisoned").get(&id).cloned())
    }

    fn get_all_tasks(&self) -> Result<Vec<Task>> {
        Ok(self.mirror.lock().expect("mirror poisoned").values().cloned().collect())
    }

    fn get_tasks_by_status(&self, status: TaskStatus) -> Result<Vec<Task>> {
        Ok(self
            .mirror
            .lock()
            .expect("mirror poisoned")
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect())
    }

    fn update_task_status(&self, id: Uuid, status: TaskStatus) -> Result<bool> {
        let mut mirror = self.mirror.lock().expect("mirror poisoned");
        let Some(task) = mirror.get_mut(&id) else {
            return Ok(false);
        };
        if task.status == status {
            return Ok(true);
        }
        Ok(task.transition_to(status).is_ok())
    }

    fn delete_task(&self, id: Uuid) -> Result<bool> {
        let mut mirror = self.mirror.lock().expect("mirror poisoned");
        let Some(task) = mirror.remove(&id) else {
            return Ok(false);
        };
        if let Some(receipt) = task.receipt_handle {
            self.transport.delete(&receipt)?;
        }
        Ok(true)
    }

    fn size(&self) -> Result<usize> {
        self.transport.approximate_count()
    }
}

/// HTTP-backed [`RemoteQueueTransport`] for a generic REST queue service:
/// `POST /messages` to send, `POST /messages/receive` to long-poll, `DELETE
/// /messages/{receipt_handle}` to ack, `GET /messages/count` for the
/// approximate size. Bridges the blocking `RemoteQueueTransport` contract to
/// `reqwest`'s async client by driving a dedicated Tokio runtime, so the
/// worker thread can call it without itself being an async task.
pub struct HttpRemoteQueueTransport {
    base_url: reqwest::Url,
    client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
}

impl HttpRemoteQueueTransport {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = base_url
            .parse()
            .map_err(|e| Error::invalid_input(format!("invalid remote queue URL: {e}")))?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::backend_unavailable(format!("build queue runtime: {e}")))?;
        Ok(Self {
            base_url,
            client: reqwest::Client::new(),
            runtime,
        })
    }
}

#[derive(Serialize)]
struct SendRequest {
    body: Value,
    attributes: HashMap<String, String>,
}

#[derive(Deserialize)]
struct ReceiveResponseMessage {
    body: Value,
    receipt_handle: String,
}

#[derive(Serialize)]
struct ReceiveRequest {
    max: usize,
    wait_seconds: u64,
}

#[derive(Deserialize)]
struct CountResponse {
    approximate_count: usize,
}

impl RemoteQueueTransport for HttpRemoteQueueTransport {
    fn send(&self, body: Value, attrs: HashMap<String, String>) -> Result<()> {
        self.runtime.block_on(async {
            let url = self
                .base_url
                .join("messages")
                .map_err(|e| Error::backend_unavailable(format!("build send URL: {e}")))?;
            self.client
                .post(url)
                .json(&SendRequest {
                    body,
                    attributes: attrs,
                })
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| Error::backend_unavailable(format!("send message: {e}")))?;
            Ok(())
        })
    }

    fn receive(&self, max: usize, wait: Duration) -> Result<Vec<RemoteMessage>> {
        self.runtime.block_on(async {
            let url = self
                .base_url
                .join("messages/receive")
                .map_err(|e| Error::backend_unavailable(format!("build receive URL: {e}")))?;
            let resp = self
                .client
                .post(url)
                .json(&ReceiveRequest {
                    max,
                    wait_seconds: wait.as_secs(),
                })
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| Error::backend_unavailable(format!("receive messages: {e}")))?;

            let messages: Vec<ReceiveResponseMessage> = resp
                .json()
                .await
                .map_err(|e| Error::backend_unavailable(format!("decode receive response: {e}")))?;

            Ok(messages
                .into_iter()
                .map(|m| RemoteMessage {
                    body: m.body,
                    receipt_handle: m.receipt_handle,
                })
                .collect())
        })
    }

    fn delete(&self, receipt_handle: &str) -> Result<()> {
        self.runtime.block_on(async {
            let url = self
                .base_url
                .join(&format!("messages/{receipt_handle}"))
                .map_err(|e| Error::backend_unavailable(format!("build delete URL: {e}")))?;
            self.client
                .delete(url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| Error::backend_unavailable(format!("delete message: {e}")))?;
            Ok(())
        })
    }

    fn approximate_count(&self) -> Result<usize> {
        self.runtime.block_on(async {
            let url = self
                .base_url
                .join("messages/count")
                .map_err(|e| Error::backend_unavailable(format!("build count URL: {e}")))?;
            let resp = self
                .client
                .get(url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| Error::backend_unavailable(format!("count messages: {e}")))?;
            let count: CountResponse = resp
                .json()
                .await
                .map_err(|e| Error::backend_unavailable(format!("decode count response: {e}")))?;
            Ok(count.approximate_count)
        })
    }
}

/// In-memory [`RemoteQueueTransport`] fake for tests: no real network hop,
/// but the same send/receive/delete/approximate_count contract, including
/// receipt-handle bookkeeping.
#[derive(Default)]
pub struct FakeRemoteQueueTransport {
    messages: Mutex<Vec<(String, Value)>>,
    next_handle: Mutex<u64>,
}

impl FakeRemoteQueueTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RemoteQueueTransport for FakeRemoteQueueTransport {
    fn send(&self, body: Value, _attrs: HashMap<String, String>) -> Result<()> {
        let mut handle = self.next_handle.lock().expect("poisoned");
        let receipt = format!("receipt-{handle}");
        *handle += 1;
        self.messages.lock().expect("poisoned").push((receipt, body));
        Ok(())
    }

    fn receive(&self, max: usize, _wait: Duration) -> Result<Vec<RemoteMessage>> {
        let mut messages = self.messages.lock().expect("poisoned");
        let take = max.min(messages.len());
        Ok(messages
            .drain(0..take)
            .map(|(receipt_handle, body)| RemoteMessage { body, receipt_handle })
            .collect())
    }

    fn delete(&self, _receipt_handle: &str) -> Result<()> {
        Ok(())
    }

    fn approximate_count(&self) -> Result<usize> {
        Ok(self.messages.lock().expect("poisoned").len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> RemoteQueueAdapter {
        RemoteQueueAdapter::new(Box::new(FakeRemoteQueueTransport::new()))
    }

    #[test]
    fn enqueue_then_dequeue_round_trips_through_transport() {
        let q = adapter();
        let id = q.enqueue("A".into(), 2, HashMap::new(), None, None).unwrap();
        let task = q.dequeue(Some(Duration::from_millis(10))).unwrap().unwrap();
        assert_eq!(task.id, id);
        assert_eq!(task.status, TaskStatus::Processing);
        assert!(task.receipt_handle.is_some());
    }

    #[test]
    fn dequeue_on_empty_queue_returns_none() {
        let q = adapter();
        assert!(q.dequeue(Some(Duration::from_millis(10))).unwrap().is_none());
    }

    #[test]
    fn delete_acks_and_removes_from_mirror() {
        let q = adapter();
        let id = q.enqueue("A".into(), 1, HashMap::new(), None, None).unwrap();
        q.dequeue(Some(Duration::from_millis(10))).unwrap();
        assert!(q.delete_task(id).unwrap());
        assert!(q.get_task(id).unwrap().is_none());
    }

    #[test]
    fn size_reports_transport_approximate_count() {
        let q = adapter();
        q.enqueue("A".into(), 1, HashMap::new(), None, None).unwrap();
        q.enqueue("B".into(), 1, HashMap::new(), None, None).unwrap();
        assert_eq!(q.size().unwrap(), 2);
    }
}
