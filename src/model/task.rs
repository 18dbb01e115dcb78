use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Stable task identifier. Never reused, never renumbered.
pub type TaskId = String;

/// A single schedule task as persisted in the task table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Opaque stable identifier
    pub id: TaskId,
    /// Outline position like `3.2.1`; unique within a project
    pub hierarchy_number: String,
    /// Parent task, `None` for top-level tasks
    #[serde(default)]
    pub parent_id: Option<TaskId>,
    /// Sibling sort key, independent of numbering
    #[serde(default)]
    pub order_index: i64,
    pub name: String,
    /// Predecessor references like `4.21FS+2`
    #[serde(default)]
    pub predecessors: Vec<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub duration_days: Option<i64>,
    /// 0–100
    #[serde(default)]
    pub progress_percent: u8,
    #[serde(default)]
    pub resources: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new task with a fresh id. The hierarchy number is provisional
    /// until the next renumbering pass.
    pub fn new(name: impl Into<String>, hierarchy_number: impl Into<String>) -> Self {
        Task {
            id: uuid::Uuid::new_v4().to_string(),
            hierarchy_number: hierarchy_number.into(),
            parent_id: None,
            order_index: 0,
            name: name.into(),
            predecessors: Vec::new(),
            start_date: None,
            end_date: None,
            duration_days: None,
            progress_percent: 0,
            resources: Vec::new(),
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    /// Apply a set of field-only values onto this task.
    pub fn apply_fields(&mut self, fields: &TaskFields) {
        if let Some(ref name) = fields.name {
            self.name = name.clone();
        }
        if let Some(date) = fields.start_date {
            self.start_date = Some(date);
        }
        if let Some(date) = fields.end_date {
            self.end_date = Some(date);
        }
        if let Some(days) = fields.duration_days {
            self.duration_days = Some(days);
        }
        if let Some(progress) = fields.progress_percent {
            self.progress_percent = progress.min(100);
        }
        if let Some(ref resources) = fields.resources {
            self.resources = resources.clone();
        }
        if let Some(ref preds) = fields.predecessors {
            self.predecessors = preds.clone();
        }
    }

    /// Apply a store row update onto this task.
    pub fn apply_patch(&mut self, patch: &TaskPatch) {
        if let Some(ref number) = patch.hierarchy_number {
            self.hierarchy_number = number.clone();
        }
        if let Some(ref parent) = patch.parent_id {
            self.parent_id = parent.clone();
        }
        if let Some(order) = patch.order_index {
            self.order_index = order;
        }
        if let Some(at) = patch.updated_at {
            self.updated_at = Some(at);
        }
        self.apply_fields(&patch.fields);
    }
}

/// Field-only values for a task. Every field is optional; `None` means
/// "leave unchanged".
///
/// Every field holds a last value, never a delta, so merging and
/// re-applying the same set is idempotent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_days: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predecessors: Option<Vec<String>>,
}

impl TaskFields {
    /// Shallow merge: every field set in `newer` overwrites this one.
    pub fn merge(&mut self, newer: TaskFields) {
        if newer.name.is_some() {
            self.name = newer.name;
        }
        if newer.start_date.is_some() {
            self.start_date = newer.start_date;
        }
        if newer.end_date.is_some() {
            self.end_date = newer.end_date;
        }
        if newer.duration_days.is_some() {
            self.duration_days = newer.duration_days;
        }
        if newer.progress_percent.is_some() {
            self.progress_percent = newer.progress_percent;
        }
        if newer.resources.is_some() {
            self.resources = newer.resources;
        }
        if newer.predecessors.is_some() {
            self.predecessors = newer.predecessors;
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == TaskFields::default()
    }
}

/// One partial row for a batched store update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub id: TaskId,
    pub hierarchy_number: Option<String>,
    /// `Some(None)` moves the task to the top level
    pub parent_id: Option<Option<TaskId>>,
    pub order_index: Option<i64>,
    pub updated_at: Option<DateTime<Utc>>,
    pub fields: TaskFields,
}

impl TaskPatch {
    pub fn new(id: impl Into<TaskId>) -> Self {
        TaskPatch {
            id: id.into(),
            ..TaskPatch::default()
        }
    }

    /// A row that only rewrites the hierarchy number.
    pub fn number(id: impl Into<TaskId>, hierarchy_number: impl Into<String>) -> Self {
        TaskPatch {
            id: id.into(),
            hierarchy_number: Some(hierarchy_number.into()),
            ..TaskPatch::default()
        }
    }

    pub fn touched(mut self, at: DateTime<Utc>) -> Self {
        self.updated_at = Some(at);
        self
    }
}
