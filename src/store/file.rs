use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{StoreError, TaskStore, apply_rows, insert_row, remove_row};
use crate::io::lock::{DEFAULT_LOCK_TIMEOUT, TaskFileLock};
use crate::io::project_io::atomic_write;
use crate::model::task::{Task, TaskPatch};

type Tables = BTreeMap<String, Vec<Task>>;

/// Task table kept in `.wbs/tasks.json`, keyed by project id.
///
/// Every call is a read-modify-write of the whole file under the project's
/// advisory lock; calls from the same process also queue on an async mutex
/// so concurrent batches do not spin on the flock.
pub struct FileStore {
    wbs_dir: PathBuf,
    guard: tokio::sync::Mutex<()>,
}

impl FileStore {
    pub fn new(wbs_dir: impl Into<PathBuf>) -> Self {
        FileStore {
            wbs_dir: wbs_dir.into(),
            guard: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.wbs_dir.join("tasks.json")
    }

    async fn with_table<T, F>(&self, project_id: &str, write: bool, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Vec<Task>) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let _guard = self.guard.lock().await;
        let dir = self.wbs_dir.clone();
        let project_id = project_id.to_string();

        tokio::task::spawn_blocking(move || {
            let _lock = TaskFileLock::acquire(&dir, DEFAULT_LOCK_TIMEOUT)?;
            let path = dir.join("tasks.json");
            let mut tables = read_tables(&path)?;
            let out = f(tables.entry(project_id).or_default())?;
            if write {
                let mut content = serde_json::to_vec_pretty(&tables)?;
                content.push(b'\n');
                atomic_write(&path, &content)?;
            }
            Ok(out)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("task file worker failed: {}", e)))?
    }
}

fn read_tables(path: &Path) -> Result<Tables, StoreError> {
    if !path.exists() {
        return Ok(Tables::new());
    }
    let text = fs::read_to_string(path)?;
    if text.trim().is_empty() {
        return Ok(Tables::new());
    }
    Ok(serde_json::from_str(&text)?)
}

#[async_trait]
impl TaskStore for FileStore {
    async fn select_tasks(&self, project_id: &str) -> Result<Vec<Task>, StoreError> {
        self.with_table(project_id, false, |tasks| Ok(tasks.clone()))
            .await
    }

    async fn insert_task(&self, project_id: &str, task: Task) -> Result<Task, StoreError> {
        self.with_table(project_id, true, move |tasks| insert_row(tasks, task))
            .await
    }

    async fn update_tasks(&self, project_id: &str, rows: Vec<TaskPatch>) -> Result<(), StoreError> {
        self.with_table(project_id, true, move |tasks| apply_rows(tasks, &rows))
            .await
    }

    async fn delete_task(&self, project_id: &str, id: &str) -> Result<(), StoreError> {
        let id = id.to_string();
        self.with_table(project_id, true, move |tasks| remove_row(tasks, &id))
            .await
    }
}
