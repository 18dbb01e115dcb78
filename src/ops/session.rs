//! One client's editing session over a project's schedule.
//!
//! Structural edits are applied to the local task list first, then
//! persisted as one [`CommitPlan`]: the new task parked on a placeholder,
//! phase 1 with every parent/order/predecessor change, the deletes, then
//! phase 2 with the final numbers. Field edits go through the session's
//! [`UpdateQueue`]. If persistence fails the local list keeps the edit;
//! `normalize` re-reads the store and brings it back in line.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::model::config::{DeletionPolicy, ProjectConfig};
use crate::model::task::{Task, TaskFields, TaskPatch};
use crate::ops::check::needs_normalization;
use crate::ops::commit::{CommitError, CommitPlan, CommitReport, commit_plan};
use crate::ops::queue::{FlushOutcome, UpdateQueue};
use crate::ops::repair::{RepairReport, apply_repairs, repair_self_references};
use crate::ops::task_ops::{self, InsertPosition, StructuralChange, TaskError};
use crate::parse::hierarchy::infer_parent_ids;
use crate::store::{StoreError, TaskStore};

/// Error type for session operations
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Commit(#[from] CommitError),
    #[error("{0} pending field edits could not be written; retry before restructuring")]
    PendingWrites(usize),
}

/// A persisted structural edit
#[derive(Debug)]
pub struct EditOutcome {
    pub change: StructuralChange,
    pub commit: CommitReport,
}

/// What a normalize pass found and did
#[derive(Debug, Serialize)]
pub struct NormalizeOutcome {
    pub needed: bool,
    pub renumbered: usize,
    pub references_rewritten: usize,
}

pub struct EditSession {
    store: Arc<dyn TaskStore>,
    project_id: String,
    policy: DeletionPolicy,
    tasks: Vec<Task>,
    queue: UpdateQueue,
}

impl EditSession {
    /// Load a project's tasks and start a session on them.
    pub async fn load(
        store: Arc<dyn TaskStore>,
        project_id: impl Into<String>,
        policy: DeletionPolicy,
        quiet_period: Duration,
    ) -> Result<Self, SessionError> {
        let project_id = project_id.into();
        let tasks = store.select_tasks(&project_id).await?;
        tracing::debug!(project_id = %project_id, tasks = tasks.len(), "session loaded");
        let queue = UpdateQueue::new(store.clone(), project_id.clone(), quiet_period);
        Ok(EditSession {
            store,
            project_id,
            policy,
            tasks,
            queue,
        })
    }

    /// Start a session with settings from the project config.
    pub async fn open(store: Arc<dyn TaskStore>, config: &ProjectConfig) -> Result<Self, SessionError> {
        Self::load(
            store,
            config.project.id.clone(),
            config.schedule.deletion_policy,
            config.queue.quiet_period(),
        )
        .await
    }

    /// The local, optimistic view of the schedule.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn queue(&self) -> &UpdateQueue {
        &self.queue
    }

    // -----------------------------------------------------------------------
    // Structural edits
    // -----------------------------------------------------------------------

    pub async fn add_task(
        &mut self,
        parent: Option<&str>,
        position: InsertPosition,
        name: String,
    ) -> Result<EditOutcome, SessionError> {
        self.settle_queue().await?;
        let change = task_ops::add_task(&mut self.tasks, parent, position, name)?;
        self.persist(change).await
    }

    pub async fn delete_task(&mut self, task_id: &str) -> Result<EditOutcome, SessionError> {
        self.settle_queue().await?;
        let change = task_ops::delete_task(&mut self.tasks, task_id, self.policy)?;
        self.persist(change).await
    }

    pub async fn move_task(
        &mut self,
        task_id: &str,
        position: InsertPosition,
    ) -> Result<EditOutcome, SessionError> {
        self.settle_queue().await?;
        let change = task_ops::move_task(&mut self.tasks, task_id, position)?;
        self.persist(change).await
    }

    pub async fn indent(&mut self, task_id: &str) -> Result<EditOutcome, SessionError> {
        self.settle_queue().await?;
        let change = task_ops::indent(&mut self.tasks, task_id)?;
        self.persist(change).await
    }

    pub async fn outdent(&mut self, task_id: &str) -> Result<EditOutcome, SessionError> {
        self.settle_queue().await?;
        let change = task_ops::outdent(&mut self.tasks, task_id)?;
        self.persist(change).await
    }

    // -----------------------------------------------------------------------
    // Field edits
    // -----------------------------------------------------------------------

    pub fn edit_fields(&mut self, task_id: &str, fields: TaskFields) -> Result<(), SessionError> {
        let fields = task_ops::edit_fields(&mut self.tasks, task_id, fields)?;
        self.queue.queue_update(task_id, fields);
        Ok(())
    }

    pub fn add_predecessor(&mut self, task_id: &str, reference: &str) -> Result<(), SessionError> {
        let fields = task_ops::add_predecessor(&mut self.tasks, task_id, reference)?;
        self.queue.queue_update(task_id, fields);
        Ok(())
    }

    pub fn remove_predecessor(&mut self, task_id: &str, target: &str) -> Result<(), SessionError> {
        let fields = task_ops::remove_predecessor(&mut self.tasks, task_id, target)?;
        self.queue.queue_update(task_id, fields);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    /// Re-read the store and renumber only if the numbering is not
    /// canonical.
    pub async fn normalize(&mut self) -> Result<NormalizeOutcome, SessionError> {
        self.settle_queue().await?;
        self.tasks = self.store.select_tasks(&self.project_id).await?;
        if !needs_normalization(&self.tasks) {
            return Ok(NormalizeOutcome {
                needed: false,
                renumbered: 0,
                references_rewritten: 0,
            });
        }

        let before = self.tasks.clone();
        let change = task_ops::restructure(&before, &mut self.tasks, &HashMap::new());
        tracing::info!(
            renumbered = change.numbering.updates.len(),
            references = change.predecessor_updates.len(),
            "normalizing numbering"
        );
        let outcome = self.persist(change).await?;
        Ok(NormalizeOutcome {
            needed: true,
            renumbered: outcome.change.numbering.updates.len(),
            references_rewritten: outcome.change.predecessor_updates.len(),
        })
    }

    /// Re-read the store and rebuild parents and sibling order from the
    /// current numbers. For task files written without structural fields.
    pub async fn adopt_numbering(&mut self) -> Result<usize, SessionError> {
        self.settle_queue().await?;
        self.tasks = self.store.select_tasks(&self.project_id).await?;
        let before = self.tasks.clone();
        let changed = infer_parent_ids(&mut self.tasks);
        if changed == 0 {
            return Ok(0);
        }

        let patches: Vec<TaskPatch> = self
            .tasks
            .iter()
            .zip(&before)
            .filter(|(now, old)| now.parent_id != old.parent_id || now.order_index != old.order_index)
            .map(|(now, _)| TaskPatch {
                parent_id: Some(now.parent_id.clone()),
                order_index: Some(now.order_index),
                ..TaskPatch::new(now.id.clone())
            })
            .collect();
        tracing::info!(changed, "adopted structure from numbering");
        self.store.update_tasks(&self.project_id, patches).await?;
        Ok(changed)
    }

    /// Re-read the store, fix self references and write the result in one
    /// batch.
    pub async fn repair(&mut self) -> Result<RepairReport, SessionError> {
        self.settle_queue().await?;
        self.tasks = self.store.select_tasks(&self.project_id).await?;
        let report = repair_self_references(&self.tasks);
        let patches = apply_repairs(&mut self.tasks, &report);
        if !patches.is_empty() {
            self.store.update_tasks(&self.project_id, patches).await?;
        }
        Ok(report)
    }

    /// Write back anything still queued.
    pub async fn close(self) -> FlushOutcome {
        self.queue.force_flush().await
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Queued predecessor lists hold pre-edit numbers, so they must land
    /// before a renumber rewrites them.
    async fn settle_queue(&self) -> Result<(), SessionError> {
        match self.queue.force_flush().await {
            FlushOutcome::Requeued(n) => Err(SessionError::PendingWrites(n)),
            FlushOutcome::Idle | FlushOutcome::Written(_) => Ok(()),
        }
    }

    async fn persist(&self, change: StructuralChange) -> Result<EditOutcome, SessionError> {
        let plan = CommitPlan {
            updates: &change.numbering.updates,
            patches: &change.patches,
            inserted: change.inserted.as_ref(),
            deleted: &change.deleted,
        };
        let commit = commit_plan(self.store.as_ref(), &self.project_id, plan).await?;
        Ok(EditOutcome { change, commit })
    }
}
