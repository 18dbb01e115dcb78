use serde::Serialize;

use crate::model::task::{Task, TaskFields, TaskId, TaskPatch};
use crate::ops::remap::{PredecessorUpdate, apply_predecessor_updates};
use crate::parse::{hierarchy, parse_reference};

/// Result of a self-reference repair pass
#[derive(Debug, Default, Serialize)]
pub struct RepairReport {
    pub fixed_count: usize,
    pub fixes: Vec<SelfReferenceFix>,
    /// Self references left in place because no earlier sibling exists
    pub unresolved: Vec<UnresolvedSelfReference>,
    /// New predecessor lists for every task that had a fix
    #[serde(skip)]
    pub updates: Vec<PredecessorUpdate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelfReferenceFix {
    pub task_id: TaskId,
    pub number: String,
    pub before: String,
    pub after: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedSelfReference {
    pub task_id: TaskId,
    pub number: String,
    pub reference: String,
}

/// Find predecessors that point at their own task and point them at the
/// immediately preceding sibling instead.
///
/// A task at sibling position `k > 1` under `p` gets `p.(k-1)` (relation and
/// lag kept). First children have no earlier sibling to fall back on, so
/// their self references are reported and left alone.
pub fn repair_self_references(tasks: &[Task]) -> RepairReport {
    let mut report = RepairReport::default();

    for task in tasks {
        let number = task.hierarchy_number.as_str();
        let replacement = hierarchy::last_segment(number)
            .filter(|&k| k > 1 && hierarchy::is_valid(number))
            .map(|k| hierarchy::child_number(hierarchy::parent_number(number), k as usize - 1));

        let mut changed = false;
        let mut predecessors = Vec::with_capacity(task.predecessors.len());
        for raw in &task.predecessors {
            let parsed = match parse_reference(raw) {
                Ok(r) if r.target == number => r,
                _ => {
                    predecessors.push(raw.clone());
                    continue;
                }
            };
            match replacement {
                Some(ref target) => {
                    let after = parsed.retarget(target.as_str()).to_string();
                    tracing::info!(task_id = %task.id, before = %raw, after = %after, "repaired self reference");
                    report.fixes.push(SelfReferenceFix {
                        task_id: task.id.clone(),
                        number: number.to_string(),
                        before: raw.clone(),
                        after: after.clone(),
                    });
                    predecessors.push(after);
                    changed = true;
                }
                None => {
                    tracing::warn!(task_id = %task.id, reference = %raw, "self reference has no earlier sibling to point at");
                    report.unresolved.push(UnresolvedSelfReference {
                        task_id: task.id.clone(),
                        number: number.to_string(),
                        reference: raw.clone(),
                    });
                    predecessors.push(raw.clone());
                }
            }
        }

        if changed {
            report.updates.push(PredecessorUpdate {
                task_id: task.id.clone(),
                predecessors,
            });
        }
    }

    report.fixed_count = report.fixes.len();
    report
}

/// Apply a report's fixes to the task list and return the rows to write.
pub fn apply_repairs(tasks: &mut [Task], report: &RepairReport) -> Vec<TaskPatch> {
    apply_predecessor_updates(tasks, &report.updates);
    report
        .updates
        .iter()
        .map(|u| TaskPatch {
            fields: TaskFields {
                predecessors: Some(u.predecessors.clone()),
                ..TaskFields::default()
            },
            ..TaskPatch::new(u.task_id.clone())
        })
        .collect()
}
