use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{StoreError, TaskStore, apply_rows, insert_row, remove_row};
use crate::model::task::{Task, TaskPatch};

type RowPredicate = Box<dyn Fn(&TaskPatch) -> bool + Send + Sync>;

/// In-process task table.
///
/// Keeps a journal of every accepted `update_tasks` batch and can be told to
/// fail writes, which is how the commit and queue paths are exercised.
#[derive(Default)]
pub struct MemoryStore {
    projects: Mutex<HashMap<String, Vec<Task>>>,
    journal: Mutex<Vec<Vec<TaskPatch>>>,
    faults: Mutex<Faults>,
}

#[derive(Default)]
struct Faults {
    /// Fail this many upcoming `update_tasks` calls
    failing_calls: usize,
    /// Fail any batch containing a matching row
    failing_rows: Option<RowPredicate>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a project with rows, bypassing uniqueness checks.
    pub fn with_tasks(project_id: &str, tasks: Vec<Task>) -> Self {
        let store = Self::default();
        lock(&store.projects).insert(project_id.to_string(), tasks);
        store
    }

    /// Current rows of a project.
    pub fn snapshot(&self, project_id: &str) -> Vec<Task> {
        lock(&self.projects)
            .get(project_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Every accepted `update_tasks` batch, oldest first.
    pub fn journal(&self) -> Vec<Vec<TaskPatch>> {
        lock(&self.journal).clone()
    }

    pub fn fail_next_updates(&self, calls: usize) {
        lock(&self.faults).failing_calls = calls;
    }

    pub fn fail_rows_where(&self, predicate: impl Fn(&TaskPatch) -> bool + Send + Sync + 'static) {
        lock(&self.faults).failing_rows = Some(Box::new(predicate));
    }

    pub fn clear_faults(&self) {
        *lock(&self.faults) = Faults::default();
    }

    fn injected_failure(&self, rows: &[TaskPatch]) -> Option<StoreError> {
        let mut faults = lock(&self.faults);
        if faults.failing_calls > 0 {
            faults.failing_calls -= 1;
            return Some(StoreError::Unavailable("injected failure".into()));
        }
        if let Some(ref predicate) = faults.failing_rows
            && let Some(row) = rows.iter().find(|r| predicate(r))
        {
            return Some(StoreError::Unavailable(format!(
                "injected failure for row {}",
                row.id
            )));
        }
        None
    }
}

/// A poisoned lock only means another test thread panicked mid-write; the
/// table itself is still a valid value.
fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn select_tasks(&self, project_id: &str) -> Result<Vec<Task>, StoreError> {
        tokio::task::yield_now().await;
        Ok(self.snapshot(project_id))
    }

    async fn insert_task(&self, project_id: &str, task: Task) -> Result<Task, StoreError> {
        tokio::task::yield_now().await;
        let mut projects = lock(&self.projects);
        insert_row(projects.entry(project_id.to_string()).or_default(), task)
    }

    async fn update_tasks(&self, project_id: &str, rows: Vec<TaskPatch>) -> Result<(), StoreError> {
        // Let concurrent writers interleave the way network calls would
        tokio::task::yield_now().await;
        if let Some(err) = self.injected_failure(&rows) {
            return Err(err);
        }
        {
            let mut projects = lock(&self.projects);
            apply_rows(projects.entry(project_id.to_string()).or_default(), &rows)?;
        }
        lock(&self.journal).push(rows);
        Ok(())
    }

    async fn delete_task(&self, project_id: &str, id: &str) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        let mut projects = lock(&self.projects);
        remove_row(projects.entry(project_id.to_string()).or_default(), id)
    }
}
