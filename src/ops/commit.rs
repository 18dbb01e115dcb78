//! Two-phase bulk rewrite of hierarchy numbers.
//!
//! The store refuses duplicate numbers inside a project, so a swap like
//! `2→3, 3→2` cannot be written row by row. Phase 1 parks every affected
//! row on a unique placeholder; phase 2 writes the real numbers. Rows within
//! a phase are written concurrently and every result is collected before
//! the phase is judged.
//!
//! A structural edit commits as a [`CommitPlan`]. Parent, order and
//! predecessor changes ride in the phase-1 rows, so once phase 1 has
//! landed the stored structure and references are final and only numbers
//! are outstanding. A later failure leaves placeholders that a renumber
//! of the stored rows resolves to exactly the numbers those references
//! expect.

use std::collections::HashMap;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::model::task::{Task, TaskId, TaskPatch};
use crate::ops::renumber::NumberUpdate;
use crate::store::{StoreError, TaskStore};

/// Prefix of the temporary numbers written in phase 1
pub const PLACEHOLDER_PREFIX: &str = "__renumber_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitReport {
    pub updated_count: usize,
    pub total_count: usize,
    pub phase1_ms: u64,
    pub phase2_ms: u64,
}

/// Error type for the bulk committer
#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    #[error("could not insert task {task_id}: {message}")]
    Insert { task_id: TaskId, message: String },
    #[error("placeholder phase failed for {failed} of {total} tasks: {message}")]
    Phase1 {
        failed: usize,
        total: usize,
        message: String,
        phase1_ms: u64,
    },
    #[error("could not delete task {task_id}: {message}; run normalize to recover")]
    Delete {
        task_id: TaskId,
        message: String,
        phase1_ms: u64,
    },
    #[error(
        "final numbering failed for {failed} of {total} tasks ({applied} applied): {message}; run normalize to recover"
    )]
    Phase2 {
        applied: usize,
        failed: usize,
        total: usize,
        message: String,
        phase1_ms: u64,
        phase2_ms: u64,
    },
}

impl CommitError {
    /// Phase timings measured before the failure, in ms.
    pub fn timings(&self) -> (u64, u64) {
        match *self {
            CommitError::Insert { .. } => (0, 0),
            CommitError::Phase1 { phase1_ms, .. } | CommitError::Delete { phase1_ms, .. } => (phase1_ms, 0),
            CommitError::Phase2 {
                phase1_ms, phase2_ms, ..
            } => (phase1_ms, phase2_ms),
        }
    }

    /// Final numbers that landed before the failure.
    pub fn applied(&self) -> usize {
        match *self {
            CommitError::Phase2 { applied, .. } => applied,
            _ => 0,
        }
    }
}

/// Everything one structural edit writes.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommitPlan<'a> {
    /// Existing tasks whose number changes
    pub updates: &'a [NumberUpdate],
    /// Parent, order and predecessor rows
    pub patches: &'a [TaskPatch],
    /// New task, carrying its final number
    pub inserted: Option<&'a Task>,
    pub deleted: &'a [TaskId],
}

impl CommitPlan<'_> {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.patches.is_empty() && self.inserted.is_none() && self.deleted.is_empty()
    }
}

/// Placeholder number for row `index` of a batch.
pub fn placeholder(batch: &uuid::Uuid, index: usize) -> String {
    format!("{}{}_{}", PLACEHOLDER_PREFIX, batch.simple(), index)
}

pub fn is_placeholder(number: &str) -> bool {
    number.starts_with(PLACEHOLDER_PREFIX)
}

/// Persist a numbering diff without ever holding two equal numbers.
///
/// A phase-2 failure leaves the affected rows on their placeholders; the
/// caller is expected to re-select and renumber.
pub async fn commit_numbering(
    store: &dyn TaskStore,
    project_id: &str,
    updates: &[NumberUpdate],
) -> Result<CommitReport, CommitError> {
    commit_plan(
        store,
        project_id,
        CommitPlan {
            updates,
            ..CommitPlan::default()
        },
    )
    .await
}

/// Persist a whole structural edit.
///
/// Order: the new task is inserted on a placeholder; phase 1 parks every
/// renumbered row and writes all parent, order and predecessor changes;
/// deleted rows are removed; phase 2 writes final numbers, the new task's
/// included.
pub async fn commit_plan(
    store: &dyn TaskStore,
    project_id: &str,
    plan: CommitPlan<'_>,
) -> Result<CommitReport, CommitError> {
    if plan.is_empty() {
        return Ok(CommitReport {
            updated_count: 0,
            total_count: 0,
            phase1_ms: 0,
            phase2_ms: 0,
        });
    }

    let batch = uuid::Uuid::new_v4();
    let mut finals: Vec<NumberUpdate> = plan.updates.to_vec();
    tracing::debug!(
        %batch,
        numbers = finals.len(),
        patches = plan.patches.len(),
        deleted = plan.deleted.len(),
        project_id,
        "committing numbering"
    );

    if let Some(task) = plan.inserted {
        let mut parked = task.clone();
        parked.hierarchy_number = placeholder(&batch, finals.len());
        store
            .insert_task(project_id, parked)
            .await
            .map_err(|e| CommitError::Insert {
                task_id: task.id.clone(),
                message: e.to_string(),
            })?;
        finals.push(NumberUpdate {
            id: task.id.clone(),
            hierarchy_number: task.hierarchy_number.clone(),
        });
    }

    let started = Instant::now();
    let rows = phase1_rows(&batch, plan.updates, plan.patches);
    let total1 = rows.len();
    let phase1 = join_all(rows.into_iter().map(|row| store.update_tasks(project_id, vec![row]))).await;
    let phase1_ms = elapsed_ms(started);

    let (_, failed, message) = tally(&phase1);
    if failed > 0 {
        tracing::warn!(%batch, failed, total = total1, "placeholder phase failed");
        return Err(CommitError::Phase1 {
            failed,
            total: total1,
            message,
            phase1_ms,
        });
    }

    for id in plan.deleted {
        store
            .delete_task(project_id, id)
            .await
            .map_err(|e| CommitError::Delete {
                task_id: id.clone(),
                message: e.to_string(),
                phase1_ms,
            })?;
    }

    let total = finals.len();
    let started = Instant::now();
    let now = Utc::now();
    let phase2 = join_all(finals.iter().map(|update| {
        store.update_tasks(
            project_id,
            vec![TaskPatch::number(update.id.clone(), update.hierarchy_number.clone()).touched(now)],
        )
    }))
    .await;
    let phase2_ms = elapsed_ms(started);

    let (applied, failed, message) = tally(&phase2);
    if failed > 0 {
        tracing::warn!(%batch, applied, failed, total, "final numbering phase failed");
        return Err(CommitError::Phase2 {
            applied,
            failed,
            total,
            message,
            phase1_ms,
            phase2_ms,
        });
    }

    tracing::info!(%batch, total, phase1_ms, phase2_ms, "numbering committed");
    Ok(CommitReport {
        updated_count: applied,
        total_count: total,
        phase1_ms,
        phase2_ms,
    })
}

/// One row per renumbered task (placeholder plus its patch) followed by
/// one row per patched task that keeps its number.
fn phase1_rows(batch: &uuid::Uuid, updates: &[NumberUpdate], patches: &[TaskPatch]) -> Vec<TaskPatch> {
    let mut by_id: HashMap<&str, &TaskPatch> = patches.iter().map(|p| (p.id.as_str(), p)).collect();
    let now = Utc::now();
    let mut rows: Vec<TaskPatch> = updates
        .iter()
        .enumerate()
        .map(|(i, update)| {
            let mut row = by_id
                .remove(update.id.as_str())
                .cloned()
                .unwrap_or_else(|| TaskPatch::new(update.id.clone()));
            row.hierarchy_number = Some(placeholder(batch, i));
            row
        })
        .collect();
    rows.extend(
        patches
            .iter()
            .filter(|p| by_id.contains_key(p.id.as_str()))
            .map(|p| p.clone().touched(now)),
    );
    rows
}

/// (succeeded, failed, first error message)
fn tally(results: &[Result<(), StoreError>]) -> (usize, usize, String) {
    let failed: Vec<&StoreError> = results.iter().filter_map(|r| r.as_ref().err()).collect();
    let message = failed.first().map(|e| e.to_string()).unwrap_or_default();
    (results.len() - failed.len(), failed.len(), message)
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

// ---------------------------------------------------------------------------
// Bulk renumber endpoint
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkRenumberRequest {
    pub project_id: String,
    pub updates: Vec<NumberUpdate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkRenumberResponse {
    pub success: bool,
    pub updated: usize,
    pub total: usize,
    pub elapsed_ms: u64,
    pub phase1_ms: u64,
    pub phase2_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Run a commit and report it in the endpoint's response shape. Never fails;
/// errors are carried in the response.
pub async fn bulk_renumber(store: &dyn TaskStore, request: BulkRenumberRequest) -> BulkRenumberResponse {
    let started = Instant::now();
    let total = request.updates.len();
    let result = commit_numbering(store, &request.project_id, &request.updates).await;
    let elapsed_ms = elapsed_ms(started);

    match result {
        Ok(report) => BulkRenumberResponse {
            success: true,
            updated: report.updated_count,
            total,
            elapsed_ms,
            phase1_ms: report.phase1_ms,
            phase2_ms: report.phase2_ms,
            error: None,
        },
        Err(e) => {
            let (phase1_ms, phase2_ms) = e.timings();
            BulkRenumberResponse {
                success: false,
                updated: e.applied(),
                total,
                elapsed_ms,
                phase1_ms,
                phase2_ms,
                error: Some(e.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::renumber::tests::task;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;

    fn update(id: &str, number: &str) -> NumberUpdate {
        NumberUpdate {
            id: id.into(),
            hierarchy_number: number.into(),
        }
    }

    fn numbers(store: &MemoryStore) -> Vec<(String, String)> {
        store
            .snapshot("p")
            .into_iter()
            .map(|t| (t.id, t.hierarchy_number))
            .collect()
    }

    #[tokio::test]
    async fn test_swap_commits_without_collision() {
        let store = MemoryStore::with_tasks(
            "p",
            vec![
                task("x", "1", None, 0),
                task("a", "2", None, 1),
                task("b", "3", None, 2),
            ],
        );
        let report = commit_numbering(&store, "p", &[update("a", "3"), update("b", "2")])
            .await
            .unwrap();
        assert_eq!(report.updated_count, 2);
        assert_eq!(report.total_count, 2);
        assert_eq!(
            numbers(&store),
            vec![
                ("x".into(), "1".into()),
                ("a".into(), "3".into()),
                ("b".into(), "2".into()),
            ]
        );

        let journal = store.journal();
        assert_eq!(journal.len(), 4);
        for batch in &journal[..2] {
            let number = batch[0].hierarchy_number.as_deref().unwrap();
            assert!(is_placeholder(number));
        }
        for batch in &journal[2..] {
            assert!(batch[0].updated_at.is_some());
        }
    }

    #[tokio::test]
    async fn test_placeholders_are_unique_per_row() {
        let batch = uuid::Uuid::new_v4();
        assert_ne!(placeholder(&batch, 0), placeholder(&batch, 1));
        assert!(is_placeholder(&placeholder(&batch, 7)));
        assert!(!is_placeholder("7"));
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let store = MemoryStore::new();
        let report = commit_numbering(&store, "p", &[]).await.unwrap();
        assert_eq!(report.total_count, 0);
        assert!(store.journal().is_empty());
    }

    #[tokio::test]
    async fn test_phase1_failure_skips_phase2() {
        let store = MemoryStore::with_tasks("p", vec![task("a", "2", None, 0), task("b", "3", None, 1)]);
        store.fail_rows_where(|row| row.id == "b");
        let err = commit_numbering(&store, "p", &[update("a", "3"), update("b", "2")])
            .await
            .unwrap_err();
        assert!(matches!(err, CommitError::Phase1 { failed: 1, total: 2, .. }));
        // only a's placeholder landed
        assert_eq!(store.journal().len(), 1);
        assert_eq!(store.snapshot("p")[1].hierarchy_number, "3");
    }

    #[tokio::test]
    async fn test_phase2_partial_failure_reports_counts() {
        let store = MemoryStore::with_tasks("p", vec![task("a", "2", None, 0), task("b", "3", None, 1)]);
        store.fail_rows_where(|row| {
            row.id == "b" && row.hierarchy_number.as_deref() == Some("2")
        });
        let err = commit_numbering(&store, "p", &[update("a", "3"), update("b", "2")])
            .await
            .unwrap_err();
        match err {
            CommitError::Phase2 {
                applied,
                failed,
                total,
                ref message,
                ..
            } => {
                assert_eq!((applied, failed, total), (1, 1, 2));
                assert!(message.contains("b"));
            }
            other => panic!("expected phase 2 failure, got {:?}", other),
        }
        let snapshot = store.snapshot("p");
        assert_eq!(snapshot[0].hierarchy_number, "3");
        assert!(is_placeholder(&snapshot[1].hierarchy_number));
    }

    #[tokio::test]
    async fn test_bulk_renumber_response() {
        let store = MemoryStore::with_tasks("p", vec![task("a", "2", None, 0)]);
        let response = bulk_renumber(
            &store,
            BulkRenumberRequest {
                project_id: "p".into(),
                updates: vec![update("a", "1")],
            },
        )
        .await;
        assert!(response.success);
        assert_eq!((response.updated, response.total), (1, 1));
        assert!(response.error.is_none());

        store.fail_next_updates(1);
        let response = bulk_renumber(
            &store,
            BulkRenumberRequest {
                project_id: "p".into(),
                updates: vec![update("a", "2")],
            },
        )
        .await;
        assert!(!response.success);
        assert_eq!(response.updated, 0);
        let json = serde_json::to_value(&response).unwrap();
        assert!(json["error"].as_str().unwrap().contains("placeholder"));
    }

    #[tokio::test]
    async fn test_bulk_renumber_keeps_counts_and_timings_on_phase2_failure() {
        let store = MemoryStore::with_tasks("p", vec![task("a", "2", None, 0), task("b", "3", None, 1)]);
        store.fail_rows_where(|row| row.id == "b" && row.hierarchy_number.as_deref() == Some("2"));
        let response = bulk_renumber(
            &store,
            BulkRenumberRequest {
                project_id: "p".into(),
                updates: vec![update("a", "3"), update("b", "2")],
            },
        )
        .await;
        assert!(!response.success);
        assert_eq!((response.updated, response.total), (1, 2));
        assert!(response.phase1_ms <= response.elapsed_ms);
        assert!(response.error.unwrap().contains("final numbering"));
    }

    #[test]
    fn test_error_timings() {
        let err = CommitError::Phase2 {
            applied: 3,
            failed: 1,
            total: 4,
            message: "down".into(),
            phase1_ms: 12,
            phase2_ms: 30,
        };
        assert_eq!(err.timings(), (12, 30));
        assert_eq!(err.applied(), 3);

        let err = CommitError::Phase1 {
            failed: 1,
            total: 2,
            message: "down".into(),
            phase1_ms: 7,
        };
        assert_eq!(err.timings(), (7, 0));
        assert_eq!(err.applied(), 0);
    }

    fn with_preds(mut t: Task, preds: &[&str]) -> Task {
        t.predecessors = preds.iter().map(|s| s.to_string()).collect();
        t
    }

    #[tokio::test]
    async fn test_plan_writes_references_with_placeholders() {
        // b moves ahead of a; c follows a's new number
        let store = MemoryStore::with_tasks(
            "p",
            vec![
                task("a", "1", None, 0),
                task("b", "2", None, 1),
                with_preds(task("c", "3", None, 2), &["1SS"]),
            ],
        );
        let mut order_a = TaskPatch::new("a");
        order_a.order_index = Some(1);
        let mut order_b = TaskPatch::new("b");
        order_b.order_index = Some(0);
        let mut preds_c = TaskPatch::new("c");
        preds_c.fields.predecessors = Some(vec!["2SS".into()]);
        let patches = vec![order_a, order_b, preds_c];
        let updates = vec![update("a", "2"), update("b", "1")];

        commit_plan(
            &store,
            "p",
            CommitPlan {
                updates: &updates,
                patches: &patches,
                ..CommitPlan::default()
            },
        )
        .await
        .unwrap();

        let journal = store.journal();
        // phase 1: two parked rows carrying their order, then c's references
        assert_eq!(journal.len(), 5);
        assert_eq!(journal[0][0].order_index, Some(1));
        assert!(is_placeholder(journal[0][0].hierarchy_number.as_deref().unwrap()));
        assert_eq!(journal[2][0].id, "c");
        assert_eq!(journal[2][0].hierarchy_number, None);

        let rows = store.snapshot("p");
        assert_eq!(rows[0].hierarchy_number, "2");
        assert_eq!(rows[1].hierarchy_number, "1");
        assert_eq!(rows[2].predecessors, vec!["2SS"]);
    }

    #[tokio::test]
    async fn test_plan_parks_insert_and_deletes_between_phases() {
        // a is deleted, b takes its number, the new task lands at 2
        let store = MemoryStore::with_tasks("p", vec![task("a", "1", None, 0), task("b", "2", None, 1)]);
        let new = task("n", "2", None, 1);
        let updates = vec![update("b", "1")];
        let deleted = vec!["a".to_string()];

        let report = commit_plan(
            &store,
            "p",
            CommitPlan {
                updates: &updates,
                inserted: Some(&new),
                deleted: &deleted,
                ..CommitPlan::default()
            },
        )
        .await
        .unwrap();
        assert_eq!((report.updated_count, report.total_count), (2, 2));
        assert_eq!(numbers(&store), vec![("b".into(), "1".into()), ("n".into(), "2".into())]);
    }

    #[tokio::test]
    async fn test_plan_phase1_failure_skips_deletes() {
        let store = MemoryStore::with_tasks("p", vec![task("a", "1", None, 0), task("b", "2", None, 1)]);
        store.fail_next_updates(1);
        let updates = vec![update("b", "1")];
        let deleted = vec!["a".to_string()];
        let err = commit_plan(
            &store,
            "p",
            CommitPlan {
                updates: &updates,
                deleted: &deleted,
                ..CommitPlan::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CommitError::Phase1 { .. }));
        assert_eq!(numbers(&store), vec![("a".into(), "1".into()), ("b".into(), "2".into())]);
    }
}
