use std::collections::HashSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use taskflow_core::{Error, Result, StorageBackend, Task};
use uuid::Uuid;

const MANIFEST_KEY: &str = "tasks/_index.json";

fn task_key(id: Uuid) -> String {
    let id = id.to_string();
    let shard = &id[..id.len().min(2)];
    format!("tasks/{shard}/{id}.json")
}

#[derive(Default, Serialize, Deserialize)]
struct Manifest {
    ids: Vec<Uuid>,
}

/// Object-store backed persistence, modeled on an S3-compatible PUT/GET/DELETE
/// API. Raw object stores have no cheap listing primitive short of the full
/// `ListObjectsV2` XML dance, so a small manifest object tracks which task ids
/// exist and is kept in lockstep with every save/delete.
///
/// Bridges the blocking `StorageBackend` contract to `reqwest`'s async client
/// the same way the remote queue transport does: one dedicated current-thread
/// Tokio runtime, driven with `block_on`.
pub struct RemoteObjectStorage {
    endpoint: reqwest::Url,
    bucket: String,
    client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
}

impl RemoteObjectStorage {
    pub fn new(endpoint: &str, bucket: impl Into<String>) -> Result<Self> {
        let endpoint = reqwest::Url::parse(endpoint)
            .map_err(|e| Error::invalid_input(format!("invalid object store endpoint: {e}")))?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::backend_unavailable(format!("failed to start runtime: {e}")))?;
        Ok(Self {
            endpoint,
            bucket: bucket.into(),
            client: reqwest::Client::new(),
            runtime,
        })
    }

    fn object_url(&self, key: &str) -> Result<reqwest::Url> {
        self.endpoint
            .join(&format!("{}/{}", self.bucket, key))
            .map_err(|e| Error::backend_unavailable(format!("build object url: {e}")))
    }

    async fn get_object(&self, key: &str) -> Result<Option<String>> {
        let url = self.object_url(key)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::backend_unavailable(format!("GET {key}: {e}")))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response
            .error_for_status()
            .map_err(|e| Error::backend_unavailable(format!("GET {key}: {e}")))?;
        let body = response
            .text()
            .await
            .map_err(|e| Error::backend_unavailable(format!("read body for {key}: {e}")))?;
        Ok(Some(body))
    }

    async fn put_object(&self, key: &str, body: String) -> Result<()> {
        let url = self.object_url(key)?;
        self.client
            .put(url)
            .body(body)
            .send()
            .await
            .map_err(|e| Error::backend_unavailable(format!("PUT {key}: {e}")))?
            .error_for_status()
            .map_err(|e| Error::backend_unavailable(format!("PUT {key}: {e}")))?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<bool> {
        let url = self.object_url(key)?;
        let response = self
            .client
            .delete(url)
            .send()
            .await
            .map_err(|e| Error::backend_unavailable(format!("DELETE {key}: {e}")))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        response
            .error_for_status()
            .map_err(|e| Error::backend_unavailable(format!("DELETE {key}: {e}")))?;
        Ok(true)
    }

    async fn load_manifest(&self) -> Result<Manifest> {
        match self.get_object(MANIFEST_KEY).await? {
            Some(body) => serde_json::from_str(&body)
                .map_err(|e| Error::backend_unavailable(format!("corrupted manifest: {e}"))),
            None => Ok(Manifest::default()),
        }
    }

    async fn save_manifest(&self, manifest: &Manifest) -> Result<()> {
        let body = serde_json::to_string(manifest)
            .map_err(|e| Error::backend_unavailable(format!("encode manifest: {e}")))?;
        self.put_object(MANIFEST_KEY, body).await
    }

    async fn save_task_async(&self, task: &Task) -> Result<bool> {
        let body = serde_json::to_string_pretty(task)
            .map_err(|e| Error::backend_unavailable(format!("encode task: {e}")))?;
        self.put_object(&task_key(task.id), body).await?;

        let mut manifest = self.load_manifest().await?;
        if !manifest.ids.contains(&task.id) {
            manifest.ids.push(task.id);
            self.save_manifest(&manifest).await?;
        }
        tracing::info!(event = "taskflow.storage.save", task_id = %task.id, "task persisted to object store");
        Ok(true)
    }

    async fn load_task_async(&self, id: Uuid) -> Result<Option<Task>> {
        match self.get_object(&task_key(id)).await? {
            Some(body) => {
                let task = serde_json::from_str(&body)
                    .map_err(|e| Error::backend_unavailable(format!("corrupted task {id}: {e}")))?;
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }

    async fn delete_task_async(&self, id: Uuid) -> Result<bool> {
        let existed = self.delete_object(&task_key(id)).await?;
        if existed {
            let mut manifest = self.load_manifest().await?;
            let before = manifest.ids.len();
            manifest.ids.retain(|existing| *existing != id);
            if manifest.ids.len() != before {
                self.save_manifest(&manifest).await?;
            }
        }
        Ok(existed)
    }

    async fn list_all_tasks_async(&self) -> Result<Vec<Uuid>> {
        Ok(self.load_manifest().await?.ids)
    }

    async fn backup_all_tasks_async(&self) -> Result<String> {
        let ids = self.list_all_tasks_async().await?;
        let mut seen = HashSet::new();
        let mut tasks = Vec::with_capacity(ids.len());
        for id in ids {
            if !seen.insert(id) {
                continue;
            }
            if let Some(task) = self.load_task_async(id).await? {
                tasks.push(task);
            }
        }

        let body = serde_json::to_string_pretty(&tasks)
            .map_err(|e| Error::backend_unavailable(format!("encode backup: {e}")))?;
        let key = format!("backups/backup_{}.json", Utc::now().timestamp());
        self.put_object(&key, body).await?;
        tracing::info!(event = "taskflow.storage.backup", key = %key, count = tasks.len(), "backup created");
        Ok(format!("s3://{}/{key}", self.bucket))
    }

    async fn restore_from_backup_async(&self, handle: &str) -> Result<usize> {
        let prefix = format!("s3://{}/", self.bucket);
        let key = handle.strip_prefix(&prefix).unwrap_or(handle);
        let body = self
            .get_object(key)
            .await?
            .ok_or_else(|| Error::not_found(format!("backup {handle}")))?;
        let tasks: Vec<Task> = serde_json::from_str(&body)
            .map_err(|e| Error::backend_unavailable(format!("corrupted backup {handle}: {e}")))?;

        let mut restored = 0;
        for task in &tasks {
            if self.save_task_async(task).await? {
                restored += 1;
            }
        }
        Ok(restored)
    }
}

impl StorageBackend for RemoteObjectStorage {
    fn save_task(&self, task: &Task) -> Result<bool> {
        self.runtime.block_on(self.save_task_async(task))
    }

    fn load_task(&self, id: Uuid) -> Result<Option<Task>> {
        self.runtime.block_on(self.load_task_async(id))
    }

    fn delete_task(&self, id: Uuid) -> Result<bool> {
        self.runtime.block_on(self.delete_task_async(id))
    }

    fn list_all_tasks(&self) -> Result<Vec<Uuid>> {
        self.runtime.block_on(self.list_all_tasks_async())
    }

    fn backup_all_tasks(&self) -> Result<String> {
        self.runtime.block_on(self.backup_all_tasks_async())
    }

    fn restore_from_backup(&self, handle: &str) -> Result<usize> {
        self.runtime.block_on(self.restore_from_backup_async(handle))
    }
}
