use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use taskflow_core::{Error, Result, StorageBackend, Task};
use uuid::Uuid;

/// JSON-file persistence for terminal task state, atomic on every write.
///
/// Tasks shard two levels deep by the first two characters of their id
/// (`tasks/<shard>/<id>.json`), matching the original implementation's
/// directory layout so operators can find a task file without an index.
pub struct LocalFsStorage {
    tasks_dir: PathBuf,
    backups_dir: PathBuf,
}

impl LocalFsStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        let tasks_dir = base_path.join("tasks");
        let backups_dir = base_path.join("backups");
        fs::create_dir_all(&tasks_dir)
            .map_err(|e| Error::backend_unavailable(format!("create tasks dir: {e}")))?;
        fs::create_dir_all(&backups_dir)
            .map_err(|e| Error::backend_unavailable(format!("create backups dir: {e}")))?;
        Ok(Self {
            tasks_dir,
            backups_dir,
        })
    }

    fn task_path(&self, id: Uuid) -> PathBuf {
        let id = id.to_string();
        let shard = &id[..id.len().min(2)];
        self.tasks_dir.join(shard).join(format!("{id}.json"))
    }

    fn shard_dirs(&self) -> Result<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        let entries = fs::read_dir(&self.tasks_dir)
            .map_err(|e| Error::backend_unavailable(format!("read tasks dir: {e}")))?;
        for entry in entries {
            let entry = entry.map_err(|e| Error::backend_unavailable(format!("read dir entry: {e}")))?;
            if entry.path().is_dir() {
                dirs.push(entry.path());
            }
        }
        Ok(dirs)
    }

    fn atomic_write_json<T: serde::Serialize>(dir: &Path, path: &Path, value: &T) -> Result<()> {
        fs::create_dir_all(dir).map_err(|e| Error::backend_unavailable(format!("create dir: {e}")))?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| Error::backend_unavailable(format!("create temp file: {e}")))?;
        serde_json::to_writer_pretty(tmp.as_file_mut(), value)
            .map_err(|e| Error::backend_unavailable(format!("encode json: {e}")))?;
        tmp.persist(path)
            .map_err(|e| Error::backend_unavailable(format!("persist temp file: {e}")))?;
        Ok(())
    }
}

impl StorageBackend for LocalFsStorage {
    fn save_task(&self, task: &Task) -> Result<bool> {
        let path = self.task_path(task.id);
        let dir = path.parent().expect("task_path always has a parent");
        Self::atomic_write_json(dir, &path, task)?;
        tracing::info!(event = "taskflow.storage.save", task_id = %task.id, "task persisted to local fs");
        Ok(true)
    }

    fn load_task(&self, id: Uuid) -> Result<Option<Task>> {
        let path = self.task_path(id);
        match fs::read_to_string(&path) {
            Ok(contents) => {
                let task = serde_json::from_str(&contents)
                    .map_err(|e| Error::backend_unavailable(format!("corrupted task file {id}: {e}")))?;
                Ok(Some(task))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::backend_unavailable(format!("read task file {id}: {e}"))),
        }
    }

    fn delete_task(&self, id: Uuid) -> Result<bool> {
        let path = self.task_path(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::backend_unavailable(format!("delete task file {id}: {e}"))),
        }
    }

    fn list_all_tasks(&self) -> Result<Vec<Uuid>> {
        let mut ids = Vec::new();
        for shard_dir in self.shard_dirs()? {
            let entries = fs::read_dir(&shard_dir)
                .map_err(|e| Error::backend_unavailable(format!("read shard dir: {e}")))?;
            for entry in entries {
                let entry = entry.map_err(|e| Error::backend_unavailable(format!("read dir entry: {e}")))?;
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    if let Ok(id) = Uuid::parse_str(stem) {
                        ids.push(id);
                    }
                }
            }
        }
        Ok(ids)
    }

    fn backup_all_tasks(&self) -> Result<String> {
        let ids = self.list_all_tasks()?;
        let mut tasks = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(task) = self.load_task(id)? {
                tasks.push(task);
            }
        }

        let backup_path = self
            .backups_dir
            .join(format!("backup_{}.json", Utc::now().timestamp()));
        Self::atomic_write_json(&self.backups_dir, &backup_path, &tasks)?;
        tracing::info!(event = "taskflow.storage.backup", path = %backup_path.display(), count = tasks.len(), "backup created");
        Ok(backup_path.display().to_string())
    }

    fn restore_from_backup(&self, handle: &str) -> Result<usize> {
        let contents = fs::read_to_string(handle)
            .map_err(|e| Error::backend_unavailable(format!("read backup {handle}: {e}")))?;
        let tasks: Vec<Task> = serde_json::from_str(&contents)
            .map_err(|e| Error::backend_unavailable(format!("corrupted backup {handle}: {e}")))?;

        let mut restored = 0;
        for task in &tasks {
            if self.save_task(task)? {
                restored += 1;
            }
        }
        Ok(restored)
    }
}
