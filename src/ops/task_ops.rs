use std::collections::{HashMap, HashSet};

use crate::model::config::DeletionPolicy;
use crate::model::task::{Task, TaskFields, TaskId, TaskPatch};
use crate::ops::remap::{
    PredecessorUpdate, apply_predecessor_updates, remap_predecessors, resolve_deleted_references,
};
use crate::ops::renumber::{NumberingDiff, compact_order_indexes, numbering_diff, renumber, sibling_order};
use crate::parse::{ReferenceError, hierarchy, parse_reference};

/// Error type for task operations
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("task not found: {0}")]
    NotFound(String),
    #[error("invalid position: {0}")]
    InvalidPosition(String),
    #[error("cannot indent {0}: it has no preceding sibling")]
    CannotIndent(String),
    #[error("cannot outdent {0}: it is already top-level")]
    CannotOutdent(String),
    #[error("invalid predecessor reference: {0}")]
    InvalidReference(#[from] ReferenceError),
    #[error("no task is numbered {0}")]
    UnknownTarget(String),
    #[error("task {0} cannot depend on itself")]
    SelfReference(String),
    #[error("task {task} already has predecessor {reference}")]
    DuplicateReference { task: String, reference: String },
    #[error("task {task} has no predecessor on {target}")]
    NoSuchReference { task: String, target: String },
}

/// Where to put a task among its siblings
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertPosition {
    /// First child
    Top,
    /// Last child
    Bottom,
    /// Right after the sibling with this id
    After(TaskId),
}

/// Everything a structural edit changed, ready to persist.
#[derive(Debug, Default)]
pub struct StructuralChange {
    /// Number changes for tasks that existed before the edit
    pub numbering: NumberingDiff,
    /// Final predecessor lists of tasks whose references moved
    pub predecessor_updates: Vec<PredecessorUpdate>,
    /// Parent, order and predecessor changes; numbers go through the
    /// two-phase commit instead
    pub patches: Vec<TaskPatch>,
    /// Task created by the edit, with its final number
    pub inserted: Option<Task>,
    /// Tasks removed by the edit
    pub deleted: Vec<TaskId>,
}

// ---------------------------------------------------------------------------
// Structural edits
// ---------------------------------------------------------------------------

/// Add a task under `parent` (or at the top level).
pub fn add_task(
    tasks: &mut Vec<Task>,
    parent: Option<&str>,
    position: InsertPosition,
    name: String,
) -> Result<StructuralChange, TaskError> {
    if let Some(parent_id) = parent {
        find(tasks, parent_id)?;
    }
    let before = tasks.clone();

    let mut task = Task::new(name, "");
    task.parent_id = parent.map(str::to_string);
    task.hierarchy_number = provisional_number(tasks, parent, &position)?;
    let id = task.id.clone();
    tasks.push(task);
    place(tasks, &id, parent, &position)?;

    let mut change = restructure(&before, tasks, &HashMap::new());
    change.inserted = tasks.iter().find(|t| t.id == id).cloned();
    Ok(change)
}

/// Delete a task and its whole subtree.
///
/// References to any deleted task are handled per `policy`: with
/// `PrecedingSibling` they move to the deleted task's preceding sibling,
/// otherwise (or when there is none) they are dropped.
pub fn delete_task(
    tasks: &mut Vec<Task>,
    task_id: &str,
    policy: DeletionPolicy,
) -> Result<StructuralChange, TaskError> {
    let root = find(tasks, task_id)?;
    let before = tasks.clone();

    let fallback = match policy {
        DeletionPolicy::PrecedingSibling => preceding_sibling(tasks, root).map(|i| tasks[i].hierarchy_number.clone()),
        DeletionPolicy::Drop => None,
    };

    let doomed = subtree(tasks, task_id);
    let fallbacks: HashMap<String, Option<String>> = tasks
        .iter()
        .filter(|t| doomed.contains(t.id.as_str()))
        .map(|t| (t.hierarchy_number.clone(), fallback.clone()))
        .collect();
    tracing::debug!(task_id, deleted = doomed.len(), fallback = ?fallback, "deleting subtree");

    let mut deleted: Vec<TaskId> = Vec::with_capacity(doomed.len());
    tasks.retain(|t| {
        if doomed.contains(t.id.as_str()) {
            deleted.push(t.id.clone());
            false
        } else {
            true
        }
    });

    let mut change = restructure(&before, tasks, &fallbacks);
    change.deleted = deleted;
    Ok(change)
}

/// Reorder a task among its current siblings.
pub fn move_task(
    tasks: &mut [Task],
    task_id: &str,
    position: InsertPosition,
) -> Result<StructuralChange, TaskError> {
    let idx = find(tasks, task_id)?;
    let before = tasks.to_vec();
    let parent = tasks[idx].parent_id.clone();
    place(tasks, task_id, parent.as_deref(), &position)?;
    Ok(restructure(&before, tasks, &HashMap::new()))
}

/// Make a task the last child of its preceding sibling.
pub fn indent(tasks: &mut [Task], task_id: &str) -> Result<StructuralChange, TaskError> {
    let idx = find(tasks, task_id)?;
    let new_parent = preceding_sibling(tasks, idx)
        .map(|i| tasks[i].id.clone())
        .ok_or_else(|| TaskError::CannotIndent(tasks[idx].hierarchy_number.clone()))?;
    let before = tasks.to_vec();
    place(tasks, task_id, Some(&new_parent), &InsertPosition::Bottom)?;
    Ok(restructure(&before, tasks, &HashMap::new()))
}

/// Make a task the next sibling of its parent. Later siblings stay where
/// they are.
pub fn outdent(tasks: &mut [Task], task_id: &str) -> Result<StructuralChange, TaskError> {
    let idx = find(tasks, task_id)?;
    let parent_idx = tasks[idx]
        .parent_id
        .as_deref()
        .and_then(|p| tasks.iter().position(|t| t.id == p))
        .ok_or_else(|| TaskError::CannotOutdent(tasks[idx].hierarchy_number.clone()))?;
    let parent_id = tasks[parent_idx].id.clone();
    let grandparent = tasks[parent_idx].parent_id.clone();

    let before = tasks.to_vec();
    place(
        tasks,
        task_id,
        grandparent.as_deref(),
        &InsertPosition::After(parent_id),
    )?;
    Ok(restructure(&before, tasks, &HashMap::new()))
}

/// Renumber after a structural edit and carry references along.
///
/// `before` is the task list prior to the edit; `tasks` already has the
/// new parents and order. `deleted` maps numbers of removed tasks to the
/// (pre-edit) number that takes over their references. On return `tasks`
/// holds final numbers and predecessor lists.
pub fn restructure(
    before: &[Task],
    tasks: &mut [Task],
    deleted: &HashMap<String, Option<String>>,
) -> StructuralChange {
    compact_order_indexes(tasks);
    let renumbered = renumber(tasks);
    let numbering = numbering_diff(before, &renumbered);

    // Both passes work on pre-edit numbers, so run them before the new
    // numbers land.
    let resolved = resolve_deleted_references(tasks, deleted);
    apply_predecessor_updates(tasks, &resolved);
    let remapped = remap_predecessors(tasks, &numbering.old_to_new);
    apply_predecessor_updates(tasks, &remapped);

    for (task, numbered) in tasks.iter_mut().zip(renumbered) {
        task.hierarchy_number = numbered.hierarchy_number;
    }

    let previous: HashMap<&str, &Task> = before.iter().map(|t| (t.id.as_str(), t)).collect();
    let mut change = StructuralChange {
        numbering,
        ..StructuralChange::default()
    };
    for task in tasks.iter() {
        let Some(old) = previous.get(task.id.as_str()) else {
            continue;
        };
        let mut patch = TaskPatch::new(task.id.clone());
        if task.parent_id != old.parent_id {
            patch.parent_id = Some(task.parent_id.clone());
        }
        if task.order_index != old.order_index {
            patch.order_index = Some(task.order_index);
        }
        if task.predecessors != old.predecessors {
            patch.fields.predecessors = Some(task.predecessors.clone());
            change.predecessor_updates.push(PredecessorUpdate {
                task_id: task.id.clone(),
                predecessors: task.predecessors.clone(),
            });
        }
        if patch != TaskPatch::new(task.id.clone()) {
            change.patches.push(patch);
        }
    }
    change
}

// ---------------------------------------------------------------------------
// Field edits
// ---------------------------------------------------------------------------

/// Apply field values locally. Returns the fields to queue for write-back.
pub fn edit_fields(tasks: &mut [Task], task_id: &str, fields: TaskFields) -> Result<TaskFields, TaskError> {
    let idx = find(tasks, task_id)?;
    tasks[idx].apply_fields(&fields);
    Ok(fields)
}

/// Append a predecessor reference after validating it against the current
/// numbering.
pub fn add_predecessor(tasks: &mut [Task], task_id: &str, raw: &str) -> Result<TaskFields, TaskError> {
    let idx = find(tasks, task_id)?;
    let reference = parse_reference(raw)?;
    if reference.target == tasks[idx].hierarchy_number {
        return Err(TaskError::SelfReference(tasks[idx].hierarchy_number.clone()));
    }
    if !tasks.iter().any(|t| t.hierarchy_number == reference.target) {
        return Err(TaskError::UnknownTarget(reference.target));
    }
    let canonical = reference.to_string();
    if tasks[idx].predecessors.contains(&canonical) {
        return Err(TaskError::DuplicateReference {
            task: tasks[idx].hierarchy_number.clone(),
            reference: canonical,
        });
    }
    tasks[idx].predecessors.push(canonical);
    Ok(predecessor_fields(&tasks[idx]))
}

/// Remove every predecessor whose target is `target`.
pub fn remove_predecessor(tasks: &mut [Task], task_id: &str, target: &str) -> Result<TaskFields, TaskError> {
    let idx = find(tasks, task_id)?;
    let task = &mut tasks[idx];
    let before = task.predecessors.len();
    task.predecessors.retain(|raw| match parse_reference(raw) {
        Ok(r) => r.target != target,
        Err(_) => raw != target,
    });
    if task.predecessors.len() == before {
        return Err(TaskError::NoSuchReference {
            task: task.hierarchy_number.clone(),
            target: target.to_string(),
        });
    }
    Ok(predecessor_fields(task))
}

fn predecessor_fields(task: &Task) -> TaskFields {
    TaskFields {
        predecessors: Some(task.predecessors.clone()),
        ..TaskFields::default()
    }
}

// ---------------------------------------------------------------------------
// Lookup helpers
// ---------------------------------------------------------------------------

/// Find a task by id, or by hierarchy number when no id matches.
pub fn resolve_task<'a>(tasks: &'a [Task], key: &str) -> Option<&'a Task> {
    tasks
        .iter()
        .find(|t| t.id == key)
        .or_else(|| tasks.iter().find(|t| t.hierarchy_number == key))
}

fn find(tasks: &[Task], task_id: &str) -> Result<usize, TaskError> {
    tasks
        .iter()
        .position(|t| t.id == task_id)
        .ok_or_else(|| TaskError::NotFound(task_id.to_string()))
}

/// Indices of the tasks under `parent`, in sibling order.
fn siblings(tasks: &[Task], parent: Option<&str>) -> Vec<usize> {
    let mut group: Vec<usize> = tasks
        .iter()
        .enumerate()
        .filter(|(_, t)| t.parent_id.as_deref() == parent)
        .map(|(i, _)| i)
        .collect();
    group.sort_by(|&a, &b| sibling_order(&tasks[a], &tasks[b]));
    group
}

fn preceding_sibling(tasks: &[Task], idx: usize) -> Option<usize> {
    let group = siblings(tasks, tasks[idx].parent_id.as_deref());
    let pos = group.iter().position(|&i| i == idx)?;
    pos.checked_sub(1).map(|p| group[p])
}

fn subtree(tasks: &[Task], root: &str) -> HashSet<String> {
    let mut found: HashSet<String> = HashSet::new();
    let mut stack = vec![root.to_string()];
    while let Some(id) = stack.pop() {
        if !found.insert(id.clone()) {
            continue;
        }
        stack.extend(
            tasks
                .iter()
                .filter(|t| t.parent_id.as_deref() == Some(id.as_str()))
                .map(|t| t.id.clone()),
        );
    }
    found
}

/// Slot a task will take among its new siblings, before renumbering.
fn slot(tasks: &[Task], group: &[usize], position: &InsertPosition) -> Result<usize, TaskError> {
    match position {
        InsertPosition::Top => Ok(0),
        InsertPosition::Bottom => Ok(group.len()),
        InsertPosition::After(after) => group
            .iter()
            .position(|&i| tasks[i].id == *after)
            .map(|p| p + 1)
            .ok_or_else(|| TaskError::InvalidPosition(format!("{} is not a sibling", after))),
    }
}

fn provisional_number(
    tasks: &[Task],
    parent: Option<&str>,
    position: &InsertPosition,
) -> Result<String, TaskError> {
    let group = siblings(tasks, parent);
    let at = slot(tasks, &group, position)?;
    let parent_number = match parent {
        Some(p) => Some(tasks[find(tasks, p)?].hierarchy_number.as_str()),
        None => None,
    };
    Ok(hierarchy::child_number(parent_number, at + 1))
}

/// Move `task_id` under `parent` at `position` and rewrite the order of
/// that sibling group to `0..n`.
fn place(
    tasks: &mut [Task],
    task_id: &str,
    parent: Option<&str>,
    position: &InsertPosition,
) -> Result<(), TaskError> {
    let me = find(tasks, task_id)?;
    if let InsertPosition::After(after) = position
        && after == task_id
    {
        return Err(TaskError::InvalidPosition(format!("{} cannot follow itself", task_id)));
    }
    let mut group: Vec<usize> = siblings(tasks, parent)
        .into_iter()
        .filter(|&i| i != me)
        .collect();
    let at = slot(tasks, &group, position)?;
    group.insert(at, me);

    tasks[me].parent_id = parent.map(str::to_string);
    for (order, idx) in group.into_iter().enumerate() {
        tasks[idx].order_index = order as i64;
    }
    Ok(())
}
