//! Debounced write-back of field-only edits.
//!
//! One queue belongs to one editing session. Edits to the same task merge
//! per field while they wait; a single timer restarts on every edit and,
//! once the quiet period passes, everything pending goes out as one
//! `update_tasks` batch. Failed batches are put back for the next cycle, so
//! delivery is at least once and fields must hold last values.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::Utc;
use indexmap::IndexMap;
use tokio::task::JoinHandle;

use crate::model::task::{TaskFields, TaskId, TaskPatch};
use crate::store::TaskStore;

/// What a flush did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was pending
    Idle,
    /// This many task rows were written
    Written(usize),
    /// The write failed; this many rows went back into the queue
    Requeued(usize),
}

#[derive(Clone)]
pub struct UpdateQueue {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn TaskStore>,
    project_id: String,
    quiet: Duration,
    state: Mutex<QueueState>,
    /// Keeps batches in order when the timer and a manual flush overlap
    flushing: tokio::sync::Mutex<()>,
}

#[derive(Default)]
struct QueueState {
    pending: IndexMap<TaskId, TaskFields>,
    /// Bumped on every re-arm; a timer only flushes if it is still current
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl UpdateQueue {
    pub fn new(store: Arc<dyn TaskStore>, project_id: impl Into<String>, quiet: Duration) -> Self {
        UpdateQueue {
            inner: Arc::new(Inner {
                store,
                project_id: project_id.into(),
                quiet,
                state: Mutex::new(QueueState::default()),
                flushing: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Merge `fields` into the pending entry for `task_id` and restart the
    /// quiet period. Must be called inside a tokio runtime.
    pub fn queue_update(&self, task_id: impl Into<TaskId>, fields: TaskFields) {
        if fields.is_empty() {
            return;
        }
        let task_id = task_id.into();
        let mut state = self.state();
        tracing::trace!(task_id = %task_id, "queued field update");
        state.pending.entry(task_id).or_default().merge(fields);
        self.arm(&mut state);
    }

    pub fn pending_count(&self) -> usize {
        self.state().pending.len()
    }

    /// Write everything pending as one batch.
    pub async fn flush(&self) -> FlushOutcome {
        let _flushing = self.inner.flushing.lock().await;

        let drained = std::mem::take(&mut self.state().pending);
        if drained.is_empty() {
            return FlushOutcome::Idle;
        }
        let count = drained.len();

        let now = Utc::now();
        let rows: Vec<TaskPatch> = drained
            .iter()
            .map(|(id, fields)| TaskPatch {
                fields: fields.clone(),
                ..TaskPatch::new(id.clone()).touched(now)
            })
            .collect();

        match self
            .inner
            .store
            .update_tasks(&self.inner.project_id, rows)
            .await
        {
            Ok(()) => {
                tracing::debug!(rows = count, "flushed field updates");
                FlushOutcome::Written(count)
            }
            Err(e) => {
                tracing::warn!(error = %e, rows = count, "field update flush failed, requeueing");
                let mut state = self.state();
                // Edits queued while the batch was in flight win per field
                let newer = std::mem::take(&mut state.pending);
                let mut restored = drained;
                for (id, fields) in newer {
                    restored.entry(id).or_default().merge(fields);
                }
                state.pending = restored;
                self.arm(&mut state);
                FlushOutcome::Requeued(count)
            }
        }
    }

    /// Cancel the timer and flush now.
    pub async fn force_flush(&self) -> FlushOutcome {
        {
            let mut state = self.state();
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            state.generation += 1;
        }
        self.flush().await
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn arm(&self, state: &mut QueueState) {
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.generation += 1;
        let generation = state.generation;
        let quiet = self.inner.quiet;
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);

        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            let Some(inner) = inner.upgrade() else {
                return;
            };
            let queue = UpdateQueue { inner };
            {
                let mut state = queue.state();
                if state.generation != generation {
                    return;
                }
                // Detach so a later edit cannot abort a flush in progress
                state.timer = None;
            }
            queue.flush().await;
        }));
    }
}
