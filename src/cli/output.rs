use serde::Serialize;

use crate::model::task::Task;
use crate::ops::check::{CheckError, CheckResult, CheckWarning};
use crate::ops::commit::CommitReport;
use crate::ops::renumber::NumberUpdate;
use crate::ops::repair::RepairReport;
use crate::parse::hierarchy;

// ---------------------------------------------------------------------------
// JSON output structs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct EditJson<'a> {
    pub action: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<&'a Task>,
    pub renumbered: &'a [NumberUpdate],
    pub references_rewritten: usize,
    pub commit: &'a CommitReport,
}

#[derive(Serialize)]
pub struct RenumberJson<'a> {
    pub needed: bool,
    pub dry_run: bool,
    pub updates: &'a [NumberUpdate],
    pub references_rewritten: usize,
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

/// Tasks sorted by hierarchy number, malformed numbers last.
pub fn outline_order(tasks: &[Task]) -> Vec<&Task> {
    let mut sorted: Vec<&Task> = tasks.iter().collect();
    sorted.sort_by(|a, b| {
        hierarchy::compare(&a.hierarchy_number, &b.hierarchy_number).then_with(|| a.id.cmp(&b.id))
    });
    sorted
}

// ---------------------------------------------------------------------------
// Human-readable formatting
// ---------------------------------------------------------------------------

/// Format a single task as a one-line outline entry
pub fn format_task_line(task: &Task, with_deps: bool) -> String {
    let indent = "  ".repeat(hierarchy::depth(&task.hierarchy_number));
    let progress = if task.progress_percent > 0 {
        format!(" ({}%)", task.progress_percent)
    } else {
        String::new()
    };
    let deps = if with_deps && !task.predecessors.is_empty() {
        format!("  <- {}", task.predecessors.join(", "))
    } else {
        String::new()
    };
    format!("{}{}  {}{}{}", indent, task.hierarchy_number, task.name, progress, deps)
}

/// Format detailed task view
pub fn format_task_detail(task: &Task) -> Vec<String> {
    let mut lines = vec![format!("{}  {}", task.hierarchy_number, task.name)];
    lines.push(format!("id: {}", task.id));
    if let Some(ref parent) = task.parent_id {
        lines.push(format!("parent: {}", parent));
    }
    if let Some(start) = task.start_date {
        lines.push(format!("start: {}", start));
    }
    if let Some(end) = task.end_date {
        lines.push(format!("end: {}", end));
    }
    if let Some(days) = task.duration_days {
        lines.push(format!("duration: {}d", days));
    }
    lines.push(format!("progress: {}%", task.progress_percent));
    if !task.resources.is_empty() {
        lines.push(format!("resources: {}", task.resources.join(", ")));
    }
    if !task.predecessors.is_empty() {
        lines.push(format!("predecessors: {}", task.predecessors.join(", ")));
    }
    lines
}

pub fn format_check_error(err: &CheckError) -> String {
    match err {
        CheckError::DuplicateNumber { number, task_ids } => {
            format!("{} is used by {} tasks: {}", number, task_ids.len(), task_ids.join(", "))
        }
        CheckError::MalformedNumber { task_id, number } => {
            format!("{} has malformed number \"{}\"", task_id, number)
        }
        CheckError::NumberingGap { parent, missing } => match parent {
            Some(p) => format!("{}.{} is missing", p, missing),
            None => format!("top-level {} is missing", missing),
        },
        CheckError::DanglingReference { number, reference, .. } => {
            format!("{} depends on {} which does not exist", number, reference)
        }
        CheckError::SelfReference { number, reference, .. } => {
            format!("{} depends on itself ({})", number, reference)
        }
    }
}

pub fn format_check_warning(warning: &CheckWarning) -> String {
    match warning {
        CheckWarning::MalformedReference {
            task_id,
            reference,
            reason,
        } => format!("{} has unreadable predecessor \"{}\": {}", task_id, reference, reason),
        CheckWarning::StructureMismatch { task_id, number } => {
            format!("{} ({}) is numbered out of order with its parent or siblings", number, task_id)
        }
        CheckWarning::ProgressOutOfRange { task_id, progress } => {
            format!("{} has progress {}%", task_id, progress)
        }
    }
}

pub fn format_check(result: &CheckResult) -> Vec<String> {
    let mut lines = Vec::new();
    if !result.errors.is_empty() {
        lines.push("Errors:".to_string());
        lines.extend(result.errors.iter().map(|e| format!("  {}", format_check_error(e))));
    }
    if !result.warnings.is_empty() {
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.push("Warnings:".to_string());
        lines.extend(result.warnings.iter().map(|w| format!("  {}", format_check_warning(w))));
    }
    if result.needs_normalization {
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.push("Numbering is not canonical; run `wbs renumber`.".to_string());
    }
    if lines.is_empty() {
        lines.push("Schedule is valid.".to_string());
    }
    lines
}

pub fn format_repair(report: &RepairReport) -> Vec<String> {
    let mut lines: Vec<String> = report
        .fixes
        .iter()
        .map(|f| format!("{}: {} -> {}", f.number, f.before, f.after))
        .collect();
    for u in &report.unresolved {
        lines.push(format!(
            "{}: {} left as is (first sibling, no earlier task to point at)",
            u.number, u.reference
        ));
    }
    lines.push(format!(
        "{} fixed, {} unresolved",
        report.fixed_count,
        report.unresolved.len()
    ));
    lines
}
