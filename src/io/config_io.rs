use std::fs;
use std::path::Path;

use crate::io::project_io::{ProjectError, atomic_write};
use crate::model::config::{DeletionPolicy, ProjectConfig};

/// Keys accepted by `wbs config set`
pub const SETTABLE_KEYS: &[&str] = &["project.name", "queue.debounce_ms", "schedule.deletion_policy"];

/// Read the project config, returning both the parsed config and the raw
/// toml_edit Document for round-trip-safe editing.
pub fn read_config(wbs_dir: &Path) -> Result<(ProjectConfig, toml_edit::DocumentMut), ProjectError> {
    let config_path = wbs_dir.join("project.toml");
    let config_text = fs::read_to_string(&config_path).map_err(|e| ProjectError::ReadError {
        path: config_path.clone(),
        source: e,
    })?;
    let config: ProjectConfig = toml::from_str(&config_text)?;
    let doc: toml_edit::DocumentMut = config_text.parse()?;
    Ok((config, doc))
}

/// Write the config document back to disk, preserving formatting.
pub fn write_config(wbs_dir: &Path, doc: &toml_edit::DocumentMut) -> Result<(), ProjectError> {
    let config_path = wbs_dir.join("project.toml");
    atomic_write(&config_path, doc.to_string().as_bytes())?;
    Ok(())
}

/// Validate and set one dotted key in the config document.
pub fn set_value(doc: &mut toml_edit::DocumentMut, key: &str, raw: &str) -> Result<(), ProjectError> {
    let invalid = |reason: String| ProjectError::InvalidConfigValue {
        key: key.to_string(),
        reason,
    };
    let (table, field) = key
        .split_once('.')
        .filter(|_| SETTABLE_KEYS.contains(&key))
        .ok_or_else(|| invalid(format!("expected one of {}", SETTABLE_KEYS.join(", "))))?;

    let value = match key {
        "queue.debounce_ms" => {
            let ms: i64 = raw
                .parse()
                .ok()
                .filter(|ms| *ms >= 0)
                .ok_or_else(|| invalid(format!("'{}' is not a non-negative integer", raw)))?;
            toml_edit::value(ms)
        }
        "schedule.deletion_policy" => {
            let policy: DeletionPolicy = raw.parse().map_err(invalid)?;
            toml_edit::value(policy.to_string())
        }
        _ => toml_edit::value(raw),
    };

    if !doc.contains_key(table) {
        doc[table] = toml_edit::Item::Table(toml_edit::Table::new());
    }
    doc[table][field] = value;
    Ok(())
}
