use std::cmp::Ordering;
use std::collections::HashMap;

use crate::model::task::Task;

/// Split a hierarchy number into its positive integer segments.
///
/// Returns `None` for anything that is not canonical outline syntax:
/// empty segments, non-digits, zero, or leading zeros.
pub fn segments(number: &str) -> Option<Vec<u32>> {
    if number.is_empty() {
        return None;
    }
    number
        .split('.')
        .map(|seg| {
            let bytes = seg.as_bytes();
            if bytes.is_empty() || bytes[0] == b'0' || !bytes.iter().all(u8::is_ascii_digit) {
                return None;
            }
            seg.parse::<u32>().ok()
        })
        .collect()
}

pub fn is_valid(number: &str) -> bool {
    segments(number).is_some()
}

/// Whether `s` has the `<digits>(.<digits>)*` shape of a reference target.
/// Looser than [`is_valid`]: zeros and leading zeros are syntactically fine.
pub fn is_target_syntax(s: &str) -> bool {
    !s.is_empty()
        && s
            .split('.')
            .all(|seg| !seg.is_empty() && seg.bytes().all(|b| b.is_ascii_digit()))
}

/// `3.2.1` → `Some("3.2")`, `3` → `None`
pub fn parent_number(number: &str) -> Option<&str> {
    number.rsplit_once('.').map(|(parent, _)| parent)
}

/// 1-based sibling position encoded in the last segment.
pub fn last_segment(number: &str) -> Option<u32> {
    let last = number.rsplit('.').next()?;
    segments(last).and_then(|s| s.first().copied())
}

/// Number of the child at 1-based `position` under `parent`.
pub fn child_number(parent: Option<&str>, position: usize) -> String {
    match parent {
        Some(p) => format!("{}.{}", p, position),
        None => position.to_string(),
    }
}

/// Outline depth, 0 for top-level numbers.
pub fn depth(number: &str) -> usize {
    number.matches('.').count()
}

/// Outline order: numeric per segment, shorter prefix first.
/// Malformed numbers sort after well-formed ones, then lexically.
pub fn compare(a: &str, b: &str) -> Ordering {
    match (segments(a), segments(b)) {
        (Some(sa), Some(sb)) => sa.cmp(&sb),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Derive `parent_id` and `order_index` from hierarchy numbers, for task
/// sets imported without structural fields. Returns how many tasks changed.
pub fn infer_parent_ids(tasks: &mut [Task]) -> usize {
    let by_number: HashMap<String, String> = tasks
        .iter()
        .map(|t| (t.hierarchy_number.clone(), t.id.clone()))
        .collect();

    let mut changed = 0;
    for task in tasks.iter_mut() {
        let parent = parent_number(&task.hierarchy_number).and_then(|p| by_number.get(p).cloned());
        let order = last_segment(&task.hierarchy_number).map(|n| i64::from(n) - 1);
        let mut touched = false;
        if task.parent_id != parent {
            task.parent_id = parent;
            touched = true;
        }
        if let Some(order) = order
            && task.order_index != order
        {
            task.order_index = order;
            touched = true;
        }
        if touched {
            changed += 1;
        }
    }
    changed
}
