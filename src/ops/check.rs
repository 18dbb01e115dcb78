use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use crate::model::task::Task;
use crate::ops::renumber::sibling_order;
use crate::parse::{hierarchy, parse_reference};

/// First reason found for the numbering not being canonical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NumberingIssue {
    Malformed { task_id: String, number: String },
    Duplicate { number: String },
    /// Top-level numbering does not start at 1
    TopLevelStart { lowest: u32 },
    /// `missing` is absent under `parent` (`None` = top level)
    Gap { parent: Option<String>, missing: u32 },
    /// Number prefix disagrees with the task's parent
    ParentMismatch { task_id: String, number: String },
    /// Sibling numbers disagree with sibling order
    OrderMismatch { task_id: String, number: String },
}

// ---------------------------------------------------------------------------
// Normalization pre-check
// ---------------------------------------------------------------------------

/// Cheap test for whether a renumber pass would change anything.
///
/// Never returns `false` when [`crate::ops::renumber::renumber`] would
/// produce a different numbering. May return `true` for task sets that
/// renumber leaves alone (orphaned parents, for instance).
pub fn needs_normalization(tasks: &[Task]) -> bool {
    numbering_issue(tasks).is_some()
}

pub fn numbering_issue(tasks: &[Task]) -> Option<NumberingIssue> {
    if tasks.is_empty() {
        return None;
    }

    // Sibling positions grouped by the numbering-derived parent
    let mut groups: BTreeMap<Option<&str>, Vec<u32>> = BTreeMap::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for task in tasks {
        let number = task.hierarchy_number.as_str();
        let Some(last) = hierarchy::last_segment(number).filter(|_| hierarchy::is_valid(number))
        else {
            return Some(NumberingIssue::Malformed {
                task_id: task.id.clone(),
                number: number.to_string(),
            });
        };
        if !seen.insert(number) {
            return Some(NumberingIssue::Duplicate {
                number: number.to_string(),
            });
        }
        groups
            .entry(hierarchy::parent_number(number))
            .or_default()
            .push(last);
    }

    for (parent, mut positions) in groups {
        positions.sort_unstable();
        if parent.is_none() && positions[0] != 1 {
            return Some(NumberingIssue::TopLevelStart {
                lowest: positions[0],
            });
        }
        if let Some(missing) = first_gap(&positions) {
            return Some(NumberingIssue::Gap {
                parent: parent.map(str::to_string),
                missing,
            });
        }
    }

    structure_issue(tasks)
}

/// First position missing from a sorted, duplicate-free `1..=max` run.
fn first_gap(sorted: &[u32]) -> Option<u32> {
    sorted
        .iter()
        .enumerate()
        .find(|&(i, &n)| n != i as u32 + 1)
        .map(|(i, _)| i as u32 + 1)
}

/// Compare numbering with `parent_id` / `order_index`, which is what
/// renumbering actually follows.
fn structure_issue(tasks: &[Task]) -> Option<NumberingIssue> {
    let by_id: HashMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();

    let mut siblings: HashMap<Option<&str>, Vec<&Task>> = HashMap::new();
    for task in tasks {
        let expected_parent = match task.parent_id.as_deref() {
            None => None,
            Some(pid) => match by_id.get(pid) {
                Some(parent) => Some(parent.hierarchy_number.as_str()),
                None => {
                    return Some(NumberingIssue::ParentMismatch {
                        task_id: task.id.clone(),
                        number: task.hierarchy_number.clone(),
                    });
                }
            },
        };
        if hierarchy::parent_number(&task.hierarchy_number) != expected_parent {
            return Some(NumberingIssue::ParentMismatch {
                task_id: task.id.clone(),
                number: task.hierarchy_number.clone(),
            });
        }
        siblings.entry(task.parent_id.as_deref()).or_default().push(task);
    }

    for (_, mut group) in siblings {
        group.sort_by(|a, b| sibling_order(a, b));
        for (pos, task) in group.iter().enumerate() {
            if hierarchy::last_segment(&task.hierarchy_number) != Some(pos as u32 + 1) {
                return Some(NumberingIssue::OrderMismatch {
                    task_id: task.id.clone(),
                    number: task.hierarchy_number.clone(),
                });
            }
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Full integrity check
// ---------------------------------------------------------------------------

/// Structured result from `wbs check`, suitable for --json output.
#[derive(Debug, Default, Serialize)]
pub struct CheckResult {
    pub valid: bool,
    /// Whether a renumber pass would change any number
    pub needs_normalization: bool,
    pub errors: Vec<CheckError>,
    pub warnings: Vec<CheckWarning>,
}

/// A validation error (something that should be fixed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum CheckError {
    /// The same number is held by several tasks
    #[serde(rename = "duplicate_number")]
    DuplicateNumber { number: String, task_ids: Vec<String> },
    /// A number that is not dot-separated positive integers
    #[serde(rename = "malformed_number")]
    MalformedNumber { task_id: String, number: String },
    /// A sibling slot is missing
    #[serde(rename = "numbering_gap")]
    NumberingGap { parent: Option<String>, missing: u32 },
    /// A predecessor points at a number no task holds
    #[serde(rename = "dangling_reference")]
    DanglingReference {
        task_id: String,
        number: String,
        reference: String,
    },
    /// A predecessor points at its own task
    #[serde(rename = "self_reference")]
    SelfReference {
        task_id: String,
        number: String,
        reference: String,
    },
}

/// A validation warning (non-critical issue).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum CheckWarning {
    /// Predecessor text that does not parse; left untouched by every pass
    #[serde(rename = "malformed_reference")]
    MalformedReference {
        task_id: String,
        reference: String,
        reason: String,
    },
    /// Numbering disagrees with parent or sibling order (fixed by renumber)
    #[serde(rename = "structure_mismatch")]
    StructureMismatch { task_id: String, number: String },
    #[serde(rename = "progress_out_of_range")]
    ProgressOutOfRange { task_id: String, progress: u8 },
}

/// Validate a task set and return structured results.
///
/// This is a read-only operation.
pub fn check_project(tasks: &[Task]) -> CheckResult {
    let mut result = CheckResult::default();

    let mut holders: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for task in tasks {
        holders
            .entry(task.hierarchy_number.as_str())
            .or_default()
            .push(task.id.clone());
    }

    for (number, ids) in &holders {
        if ids.len() > 1 {
            result.errors.push(CheckError::DuplicateNumber {
                number: number.to_string(),
                task_ids: ids.clone(),
            });
        }
    }

    for task in tasks {
        if !hierarchy::is_valid(&task.hierarchy_number) {
            result.errors.push(CheckError::MalformedNumber {
                task_id: task.id.clone(),
                number: task.hierarchy_number.clone(),
            });
        }
        if task.progress_percent > 100 {
            result.warnings.push(CheckWarning::ProgressOutOfRange {
                task_id: task.id.clone(),
                progress: task.progress_percent,
            });
        }
        check_references(task, &holders, &mut result);
    }

    match numbering_issue(tasks) {
        Some(NumberingIssue::Gap { parent, missing }) => {
            result.errors.push(CheckError::NumberingGap { parent, missing });
        }
        Some(NumberingIssue::TopLevelStart { .. }) => {
            result.errors.push(CheckError::NumberingGap {
                parent: None,
                missing: 1,
            });
        }
        Some(NumberingIssue::ParentMismatch { task_id, number })
        | Some(NumberingIssue::OrderMismatch { task_id, number }) => {
            result
                .warnings
                .push(CheckWarning::StructureMismatch { task_id, number });
        }
        // Already reported above
        Some(NumberingIssue::Malformed { .. }) | Some(NumberingIssue::Duplicate { .. }) | None => {}
    }

    result.needs_normalization = needs_normalization(tasks);
    result.valid = result.errors.is_empty();
    result
}

fn check_references(task: &Task, holders: &BTreeMap<&str, Vec<String>>, result: &mut CheckResult) {
    for raw in &task.predecessors {
        match parse_reference(raw) {
            Ok(r) if r.target == task.hierarchy_number => {
                result.errors.push(CheckError::SelfReference {
                    task_id: task.id.clone(),
                    number: task.hierarchy_number.clone(),
                    reference: raw.clone(),
                });
            }
            Ok(r) if !holders.contains_key(r.target.as_str()) => {
                result.errors.push(CheckError::DanglingReference {
                    task_id: task.id.clone(),
                    number: task.hierarchy_number.clone(),
                    reference: raw.clone(),
                });
            }
            Ok(_) => {}
            Err(e) => {
                result.warnings.push(CheckWarning::MalformedReference {
                    task_id: task.id.clone(),
                    reference: raw.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::renumber::renumber;
    use crate::ops::renumber::tests::task;
    use pretty_assertions::assert_eq;

    fn canonical() -> Vec<Task> {
        vec![
            task("a", "1", None, 0),
            task("a1", "1.1", Some("a"), 0),
            task("a2", "1.2", Some("a"), 1),
            task("b", "2", None, 1),
        ]
    }

    #[test]
    fn test_canonical_needs_nothing() {
        assert!(!needs_normalization(&canonical()));
        assert!(!needs_normalization(&[]));
    }

    #[test]
    fn test_top_level_must_start_at_one() {
        let tasks = vec![task("a", "2", None, 0), task("b", "3", None, 1)];
        assert_eq!(
            numbering_issue(&tasks),
            Some(NumberingIssue::TopLevelStart { lowest: 2 })
        );
    }

    #[test]
    fn test_top_level_gap() {
        let tasks = vec![task("a", "1", None, 0), task("b", "3", None, 1)];
        assert_eq!(
            numbering_issue(&tasks),
            Some(NumberingIssue::Gap {
                parent: None,
                missing: 2
            })
        );
    }

    #[test]
    fn test_child_gap() {
        let mut tasks = canonical();
        tasks[2].hierarchy_number = "1.3".into();
        assert_eq!(
            numbering_issue(&tasks),
            Some(NumberingIssue::Gap {
                parent: Some("1".into()),
                missing: 2
            })
        );
    }

    #[test]
    fn test_duplicate_and_malformed() {
        let mut tasks = canonical();
        tasks[3].hierarchy_number = "1".into();
        assert!(matches!(
            numbering_issue(&tasks),
            Some(NumberingIssue::Duplicate { .. })
        ));
        tasks[3].hierarchy_number = "x".into();
        assert!(matches!(
            numbering_issue(&tasks),
            Some(NumberingIssue::Malformed { .. })
        ));
    }

    #[test]
    fn test_order_disagreement_is_detected() {
        let mut tasks = canonical();
        // swap sibling order without touching numbers
        tasks[1].order_index = 1;
        tasks[2].order_index = 0;
        assert!(matches!(
            numbering_issue(&tasks),
            Some(NumberingIssue::OrderMismatch { .. })
        ));
        assert!(!needs_normalization(&renumber(&tasks)));
    }

    #[test]
    fn test_parent_disagreement_is_detected() {
        let mut tasks = canonical();
        tasks[2].parent_id = Some("b".into());
        assert!(matches!(
            numbering_issue(&tasks),
            Some(NumberingIssue::ParentMismatch { .. })
        ));
    }

    #[test]
    fn test_check_project_references() {
        let mut tasks = canonical();
        tasks[3].predecessors = vec!["1.2FS+1".into(), "2".into(), "9".into(), "1ZZ".into()];
        let result = check_project(&tasks);
        assert!(!result.valid);
        assert_eq!(
            result.errors,
            vec![
                CheckError::SelfReference {
                    task_id: "b".into(),
                    number: "2".into(),
                    reference: "2".into(),
                },
                CheckError::DanglingReference {
                    task_id: "b".into(),
                    number: "2".into(),
                    reference: "9".into(),
                },
            ]
        );
        assert!(matches!(
            result.warnings[0],
            CheckWarning::MalformedReference { .. }
        ));
    }

    #[test]
    fn test_check_project_duplicates_and_gaps() {
        let tasks = vec![
            task("a", "1", None, 0),
            task("b", "1", None, 1),
            task("c", "4", None, 2),
        ];
        let result = check_project(&tasks);
        assert_eq!(
            result.errors[0],
            CheckError::DuplicateNumber {
                number: "1".into(),
                task_ids: vec!["a".into(), "b".into()],
            }
        );
        assert!(result.needs_normalization);
    }

    #[test]
    fn test_check_json_shape() {
        let result = check_project(&canonical());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["valid"], true);
        assert_eq!(json["needs_normalization"], false);
    }
}
