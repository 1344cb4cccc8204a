use std::sync::Arc;

use anyhow::Context;
use taskflow_core::QueueBackend;
use taskflow_core::StorageBackend;
use taskflow_queue::{HttpRemoteQueueTransport, InMemoryQueue, RemoteQueueAdapter};
use taskflow_storage::{LocalFsStorage, RemoteObjectStorage};

use crate::config::TaskFlowConfig;

pub fn build_queue(cfg: &TaskFlowConfig) -> anyhow::Result<Arc<dyn QueueBackend>> {
    match cfg.queue_backend.as_str() {
        "in_memory" => Ok(Arc::new(InMemoryQueue::new())),
        "remote" => {
            let transport = HttpRemoteQueueTransport::new(&cfg.remote_queue_url)
                .context("init remote queue transport")?;
            Ok(Arc::new(RemoteQueueAdapter::new(Box::new(transport))))
        }
        other => anyhow::bail!("unknown TASKFLOW_QUEUE_BACKEND: {other}"),
    }
}

pub fn build_storage(cfg: &TaskFlowConfig) -> anyhow::Result<Arc<dyn StorageBackend>> {
    match cfg.storage_backend.as_str() {
        "local_fs" => Ok(Arc::new(
            LocalFsStorage::new(&cfg.storage_dir).context("init local fs storage")?,
        )),
        "object_store" => Ok(Arc::new(
            RemoteObjectStorage::new(&cfg.object_store_endpoint, cfg.object_store_bucket.clone())
                .context("init object store")?,
        )),
        other => anyhow::bail!("unknown TASKFLOW_STORAGE_BACKEND: {other}"),
    }
}
