use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::model::config::ProjectConfig;
use crate::model::project::Project;

/// Name of the per-project data directory
pub const WBS_DIR: &str = ".wbs";

/// Error type for project I/O operations
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("not a wbs project: no .wbs/ directory found")]
    NotAProject,
    #[error("a wbs project already exists at {0}")]
    AlreadyInitialized(PathBuf),
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse project.toml: {0}")]
    ConfigParseError(#[from] toml::de::Error),
    #[error("could not edit project.toml: {0}")]
    ConfigEditError(#[from] toml_edit::TomlError),
    #[error("invalid config value for {key}: {reason}")]
    InvalidConfigValue { key: String, reason: String },
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Discover the project by walking up from the given directory,
/// looking for a `.wbs/` subdirectory with a project.toml.
pub fn discover_project(start: &Path) -> Result<PathBuf, ProjectError> {
    let mut current = start.to_path_buf();
    loop {
        let wbs_dir = current.join(WBS_DIR);
        if wbs_dir.is_dir() && wbs_dir.join("project.toml").exists() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(ProjectError::NotAProject);
        }
    }
}

/// Load the project config from the given root directory.
pub fn load_project(root: &Path) -> Result<Project, ProjectError> {
    let wbs_dir = root.join(WBS_DIR);
    if !wbs_dir.is_dir() {
        return Err(ProjectError::NotAProject);
    }

    let config_path = wbs_dir.join("project.toml");
    let config_text = fs::read_to_string(&config_path).map_err(|e| ProjectError::ReadError {
        path: config_path.clone(),
        source: e,
    })?;
    let config: ProjectConfig = toml::from_str(&config_text)?;

    Ok(Project {
        root: root.to_path_buf(),
        wbs_dir,
        config,
    })
}

/// Create `.wbs/` with a rendered project.toml and an empty task file.
pub fn init_project(root: &Path, project_toml: &str, force: bool) -> Result<Project, ProjectError> {
    let wbs_dir = root.join(WBS_DIR);
    if wbs_dir.join("project.toml").exists() && !force {
        return Err(ProjectError::AlreadyInitialized(root.to_path_buf()));
    }
    fs::create_dir_all(&wbs_dir)?;
    // Parse before writing so a bad template never lands on disk
    let _: ProjectConfig = toml::from_str(project_toml)?;
    atomic_write(&wbs_dir.join("project.toml"), project_toml.as_bytes())?;

    let tasks_path = wbs_dir.join("tasks.json");
    if !tasks_path.exists() || force {
        atomic_write(&tasks_path, b"{}\n")?;
    }
    load_project(root)
}

/// Write `content` to `path` atomically using a temp file + rename.
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
