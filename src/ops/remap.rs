use std::collections::HashMap;

use serde::Serialize;

use crate::model::task::{Task, TaskId};
use crate::parse::parse_reference;

/// New predecessor list for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PredecessorUpdate {
    pub task_id: TaskId,
    pub predecessors: Vec<String>,
}

/// Rewrite predecessor targets through an old→new numbering map.
///
/// Every target is looked up once in the map, so a chain like `2→3, 3→4`
/// never sends a `2` reference to `4`. Relation and lag text is kept
/// exactly. References that do not parse, or whose target did not move,
/// are left as they are. Only tasks with at least one changed reference
/// are returned.
pub fn remap_predecessors(
    tasks: &[Task],
    old_to_new: &HashMap<String, String>,
) -> Vec<PredecessorUpdate> {
    if old_to_new.is_empty() {
        return Vec::new();
    }

    let mut updates = Vec::new();
    for task in tasks {
        let mut changed = false;
        let predecessors: Vec<String> = task
            .predecessors
            .iter()
            .map(|raw| match remap_reference(raw, old_to_new) {
                Some(new) => {
                    changed = true;
                    new
                }
                None => raw.clone(),
            })
            .collect();
        if changed {
            updates.push(PredecessorUpdate {
                task_id: task.id.clone(),
                predecessors,
            });
        }
    }
    updates
}

/// Remap a single reference string; `None` when it stays as is.
pub fn remap_reference(raw: &str, old_to_new: &HashMap<String, String>) -> Option<String> {
    let parsed = match parse_reference(raw) {
        Ok(r) => r,
        Err(e) => {
            tracing::debug!(reference = %raw, error = %e, "skipping malformed predecessor");
            return None;
        }
    };
    let new_target = old_to_new.get(&parsed.target)?;
    if *new_target == parsed.target {
        return None;
    }
    Some(parsed.retarget(new_target.as_str()).to_string())
}

/// Rewrite references that point at deleted tasks.
///
/// `fallbacks` maps each deleted number to the number that should take
/// over its references (`None` drops them). Numbers are all pre-renumber.
/// A fallback that would point a task at itself, or duplicate a reference
/// already in the list, is dropped instead.
pub fn resolve_deleted_references(
    tasks: &[Task],
    fallbacks: &HashMap<String, Option<String>>,
) -> Vec<PredecessorUpdate> {
    if fallbacks.is_empty() {
        return Vec::new();
    }

    let mut updates = Vec::new();
    for task in tasks {
        let mut changed = false;
        let mut predecessors: Vec<String> = Vec::with_capacity(task.predecessors.len());

        for raw in &task.predecessors {
            let target_fallback = parse_reference(raw)
                .ok()
                .and_then(|r| fallbacks.get(&r.target).map(|f| (r, f.clone())));

            let Some((parsed, fallback)) = target_fallback else {
                predecessors.push(raw.clone());
                continue;
            };
            changed = true;

            let Some(fallback) = fallback else {
                tracing::debug!(task_id = %task.id, reference = %raw, "dropping reference to deleted task");
                continue;
            };
            if fallback == task.hierarchy_number {
                tracing::debug!(task_id = %task.id, reference = %raw, "fallback would self-reference, dropping");
                continue;
            }
            let rewritten = parsed.retarget(fallback).to_string();
            if task.predecessors.contains(&rewritten) || predecessors.contains(&rewritten) {
                continue;
            }
            predecessors.push(rewritten);
        }

        if changed {
            updates.push(PredecessorUpdate {
                task_id: task.id.clone(),
                predecessors,
            });
        }
    }
    updates
}

/// Apply predecessor updates to an in-memory task list.
pub fn apply_predecessor_updates(tasks: &mut [Task], updates: &[PredecessorUpdate]) {
    let by_id: HashMap<&str, &PredecessorUpdate> =
        updates.iter().map(|u| (u.task_id.as_str(), u)).collect();
    for task in tasks.iter_mut() {
        if let Some(update) = by_id.get(task.id.as_str()) {
            task.predecessors = update.predecessors.clone();
        }
    }
}
