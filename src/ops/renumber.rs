use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::model::task::{Task, TaskId};
use crate::parse::hierarchy;

/// A single numbering change for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberUpdate {
    pub id: TaskId,
    pub hierarchy_number: String,
}

/// Result of comparing numbering before and after a renumber pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NumberingDiff {
    /// Tasks whose number changed, in input order
    pub updates: Vec<NumberUpdate>,
    /// Old number → new number, for every task that moved
    pub old_to_new: HashMap<String, String>,
}

impl NumberingDiff {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Renumbering
// ---------------------------------------------------------------------------

/// Compute canonical outline numbering for a task forest.
///
/// Siblings (and roots) are ordered by `order_index`, then creation time,
/// then id. A task whose parent is missing, is itself, or sits on a parent
/// cycle is numbered as a top-level task. The output has the same tasks in
/// the same order as the input; only `hierarchy_number` differs.
pub fn renumber(tasks: &[Task]) -> Vec<Task> {
    let parents = effective_parents(tasks);

    let mut roots: Vec<usize> = Vec::new();
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); tasks.len()];
    for (i, parent) in parents.iter().enumerate() {
        match parent {
            Some(p) => children[*p].push(i),
            None => roots.push(i),
        }
    }
    roots.sort_by(|&a, &b| sibling_order(&tasks[a], &tasks[b]));
    for list in &mut children {
        list.sort_by(|&a, &b| sibling_order(&tasks[a], &tasks[b]));
    }

    // Explicit stack; outline depth is unbounded
    let mut numbers: Vec<String> = vec![String::new(); tasks.len()];
    let mut stack: Vec<(usize, String)> = roots
        .iter()
        .enumerate()
        .map(|(pos, &root)| (root, hierarchy::child_number(None, pos + 1)))
        .collect();
    while let Some((node, number)) = stack.pop() {
        stack.extend(
            children[node]
                .iter()
                .enumerate()
                .map(|(pos, &child)| (child, hierarchy::child_number(Some(number.as_str()), pos + 1))),
        );
        numbers[node] = number;
    }

    tasks
        .iter()
        .zip(numbers)
        .map(|(task, number)| {
            let mut task = task.clone();
            task.hierarchy_number = number;
            task
        })
        .collect()
}

/// Deterministic sibling ordering.
pub fn sibling_order(a: &Task, b: &Task) -> Ordering {
    a.order_index
        .cmp(&b.order_index)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Resolve each task's parent to an index, promoting orphans and breaking
/// cycles so every task is reachable from exactly one root.
fn effective_parents(tasks: &[Task]) -> Vec<Option<usize>> {
    let index: HashMap<&str, usize> = tasks
        .iter()
        .enumerate()
        .map(|(i, t)| (t.id.as_str(), i))
        .collect();

    let mut parents: Vec<Option<usize>> = tasks
        .iter()
        .enumerate()
        .map(|(i, task)| {
            let parent_id = task.parent_id.as_deref()?;
            match index.get(parent_id) {
                Some(&p) if p != i => Some(p),
                Some(_) => {
                    tracing::warn!(task_id = %task.id, "task is its own parent, numbering as top-level");
                    None
                }
                None => {
                    tracing::warn!(
                        task_id = %task.id,
                        parent_id = %parent_id,
                        "parent task missing, numbering as top-level"
                    );
                    None
                }
            }
        })
        .collect();

    // Walk up from every task in sibling order; a node seen twice on the
    // same walk closes a cycle and gets detached there.
    let mut order: Vec<usize> = (0..tasks.len()).collect();
    order.sort_by(|&a, &b| sibling_order(&tasks[a], &tasks[b]));

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unseen,
        OnPath,
        Done,
    }
    let mut marks = vec![Mark::Unseen; tasks.len()];

    for start in order {
        let mut path = Vec::new();
        let mut cur = start;
        loop {
            match marks[cur] {
                Mark::Done => break,
                Mark::OnPath => {
                    tracing::warn!(task_id = %tasks[cur].id, "parent cycle detected, numbering as top-level");
                    parents[cur] = None;
                    break;
                }
                Mark::Unseen => {}
            }
            marks[cur] = Mark::OnPath;
            path.push(cur);
            match parents[cur] {
                Some(p) => cur = p,
                None => break,
            }
        }
        for node in path {
            marks[node] = Mark::Done;
        }
    }

    parents
}

// ---------------------------------------------------------------------------
// Diff
// ---------------------------------------------------------------------------

/// Compare numbering per task id. Tasks present only on one side are ignored.
pub fn numbering_diff(before: &[Task], after: &[Task]) -> NumberingDiff {
    let old: HashMap<&str, &str> = before
        .iter()
        .map(|t| (t.id.as_str(), t.hierarchy_number.as_str()))
        .collect();

    // Numbers still held by a task that did not move
    let kept: HashSet<&str> = after
        .iter()
        .filter(|t| old.get(t.id.as_str()) == Some(&t.hierarchy_number.as_str()))
        .map(|t| t.hierarchy_number.as_str())
        .collect();

    let mut diff = NumberingDiff::default();
    for task in after {
        let Some(&old_number) = old.get(task.id.as_str()) else {
            continue;
        };
        if old_number == task.hierarchy_number {
            continue;
        }
        diff.updates.push(NumberUpdate {
            id: task.id.clone(),
            hierarchy_number: task.hierarchy_number.clone(),
        });
        // Two tasks shared the old number: references to it follow the task
        // that kept it, or else the first task seen.
        if kept.contains(old_number) || diff.old_to_new.contains_key(old_number) {
            tracing::warn!(
                number = %old_number,
                "duplicate hierarchy number before renumber"
            );
            continue;
        }
        diff.old_to_new
            .insert(old_number.to_string(), task.hierarchy_number.clone());
    }
    diff
}

/// Rewrite `order_index` to `0..n` within each sibling group, keeping the
/// current relative order. Returns the ids that changed.
pub fn compact_order_indexes(tasks: &mut [Task]) -> Vec<TaskId> {
    let mut groups: HashMap<Option<TaskId>, Vec<usize>> = HashMap::new();
    for (i, task) in tasks.iter().enumerate() {
        groups.entry(task.parent_id.clone()).or_default().push(i);
    }

    let mut changed = Vec::new();
    for (_, mut members) in groups {
        members.sort_by(|&a, &b| sibling_order(&tasks[a], &tasks[b]));
        for (pos, idx) in members.into_iter().enumerate() {
            let pos = pos as i64;
            if tasks[idx].order_index != pos {
                tasks[idx].order_index = pos;
                changed.push(tasks[idx].id.clone());
            }
        }
    }
    changed
}
