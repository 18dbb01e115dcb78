use std::path::PathBuf;

use super::config::ProjectConfig;

/// A discovered schedule project on disk
#[derive(Debug)]
pub struct Project {
    /// Root directory of the project (parent of `.wbs/`)
    pub root: PathBuf,
    /// Path to the `.wbs/` directory
    pub wbs_dir: PathBuf,
    /// Parsed project.toml
    pub config: ProjectConfig,
}

impl Project {
    /// Scope key used for every task store call
    pub fn id(&self) -> &str {
        &self.config.project.id
    }

    pub fn tasks_path(&self) -> PathBuf {
        self.wbs_dir.join("tasks.json")
    }
}
