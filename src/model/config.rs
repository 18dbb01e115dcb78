use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration from `.wbs/project.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub project: ProjectInfo,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub name: String,
    /// Scope key for the task table
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Quiet period before pending field edits are written back.
    /// Default: see PROJECT_TOML_TEMPLATE in cli/handlers/init.rs
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl QueueConfig {
    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            debounce_ms: default_debounce_ms(),
        }
    }
}

/// Default: see PROJECT_TOML_TEMPLATE in cli/handlers/init.rs
fn default_debounce_ms() -> u64 {
    400
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default)]
    pub deletion_policy: DeletionPolicy,
}

/// What happens to predecessor references that pointed at a deleted task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeletionPolicy {
    /// Point at the deleted task's immediately preceding sibling, or drop
    /// the reference when there is none
    #[default]
    PrecedingSibling,
    /// Always drop the reference
    Drop,
}

impl std::fmt::Display for DeletionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeletionPolicy::PrecedingSibling => write!(f, "preceding-sibling"),
            DeletionPolicy::Drop => write!(f, "drop"),
        }
    }
}

impl std::str::FromStr for DeletionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preceding-sibling" => Ok(DeletionPolicy::PrecedingSibling),
            "drop" => Ok(DeletionPolicy::Drop),
            other => Err(format!(
                "unknown deletion policy '{}' (expected preceding-sibling or drop)",
                other
            )),
        }
    }
}
