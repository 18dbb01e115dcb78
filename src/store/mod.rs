//! Task table access.
//!
//! The schedule engine only ever talks to a [`TaskStore`]. Every
//! implementation scopes rows by project id, applies an update batch
//! all-or-nothing, and refuses to let two rows in a project hold the same
//! hierarchy number. That last rule is the reason the bulk committer writes
//! placeholders first.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::io::lock::LockError;
use crate::model::task::{Task, TaskPatch};

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("hierarchy number {number} is already used in this project")]
    DuplicateNumber { number: String },
    #[error("task not found: {0}")]
    NotFound(String),
    #[error("task already exists: {0}")]
    AlreadyExists(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("could not read or write task file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse task file: {0}")]
    Serde(#[from] serde_json::Error),
    #[error(transparent)]
    Lock(#[from] LockError),
}

/// The remote task table, as seen by one client.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// All tasks of a project, in storage order.
    async fn select_tasks(&self, project_id: &str) -> Result<Vec<Task>, StoreError>;

    /// Insert a new row. Fails if the id exists or the number is taken.
    async fn insert_task(&self, project_id: &str, task: Task) -> Result<Task, StoreError>;

    /// Apply a batch of partial rows atomically.
    async fn update_tasks(&self, project_id: &str, rows: Vec<TaskPatch>) -> Result<(), StoreError>;

    /// Remove a single row. Children are not touched.
    async fn delete_task(&self, project_id: &str, id: &str) -> Result<(), StoreError>;
}

/// Insert into an in-memory table with the store's uniqueness rules.
pub(crate) fn insert_row(tasks: &mut Vec<Task>, task: Task) -> Result<Task, StoreError> {
    if tasks.iter().any(|t| t.id == task.id) {
        return Err(StoreError::AlreadyExists(task.id));
    }
    if tasks
        .iter()
        .any(|t| t.hierarchy_number == task.hierarchy_number)
    {
        return Err(StoreError::DuplicateNumber {
            number: task.hierarchy_number,
        });
    }
    tasks.push(task.clone());
    Ok(task)
}

/// Apply a batch to an in-memory table. On error the table is unchanged.
///
/// Only numbers written by this batch are checked for uniqueness, so a
/// table that already holds duplicates can still be repaired.
pub(crate) fn apply_rows(tasks: &mut Vec<Task>, rows: &[TaskPatch]) -> Result<(), StoreError> {
    let mut next = tasks.clone();
    {
        let index: HashMap<&str, usize> = tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.as_str(), i))
            .collect();
        for row in rows {
            let i = *index
                .get(row.id.as_str())
                .ok_or_else(|| StoreError::NotFound(row.id.clone()))?;
            next[i].apply_patch(row);
        }
    }

    for row in rows {
        if let Some(ref number) = row.hierarchy_number {
            let holders = next
                .iter()
                .filter(|t| &t.hierarchy_number == number)
                .count();
            if holders > 1 {
                return Err(StoreError::DuplicateNumber {
                    number: number.clone(),
                });
            }
        }
    }

    *tasks = next;
    Ok(())
}

pub(crate) fn remove_row(tasks: &mut Vec<Task>, id: &str) -> Result<(), StoreError> {
    let idx = tasks
        .iter()
        .position(|t| t.id == id)
        .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
    tasks.remove(idx);
    Ok(())
}
