use crate::cli::commands::InitArgs;
use crate::io::project_io;

const PROJECT_TOML_TEMPLATE: &str = r##"[project]
name = "{name}"
# Scopes this project's rows in the task table. Do not change after tasks exist.
id = "{id}"

[queue]
# Quiet period (ms) before queued field edits are written back
debounce_ms = 400

[schedule]
# What happens to predecessor references when their task is deleted:
#   "preceding-sibling"  point them at the deleted task's preceding sibling
#   "drop"               remove them
deletion_policy = "preceding-sibling"
"##;

/// Validate that a project id is lowercase alphanumeric with hyphens only.
fn validate_project_id(id: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err("project id cannot be empty".to_string());
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(format!(
            "invalid project id \"{}\": use lowercase with hyphens (e.g. \"riverside-clinic\")",
            id
        ));
    }
    Ok(())
}

/// Infer a project name from a directory name: replace hyphens with spaces, title-case.
fn infer_name(dir_name: &str) -> String {
    dir_name
        .split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                None => String::new(),
                Some(c) => {
                    let upper: String = c.to_uppercase().collect();
                    upper + &chars.collect::<String>()
                }
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Derive a project id from a name: lowercase, runs of other characters
/// collapsed to one hyphen.
fn infer_id(name: &str) -> String {
    let mut id = String::new();
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            id.push(c.to_ascii_lowercase());
        } else if !id.is_empty() && !id.ends_with('-') {
            id.push('-');
        }
    }
    let trimmed = id.trim_end_matches('-');
    if trimmed.is_empty() {
        "project".to_string()
    } else {
        trimmed.to_string()
    }
}

fn render_project_toml(name: &str, id: &str) -> String {
    let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
    PROJECT_TOML_TEMPLATE
        .replace("{name}", &escaped)
        .replace("{id}", id)
}

pub fn cmd_init(args: InitArgs, project_dir: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let cwd = match project_dir {
        Some(dir) => std::fs::canonicalize(dir)
            .map_err(|e| format!("cannot resolve -C path '{}': {}", dir, e))?,
        None => std::env::current_dir()?,
    };

    // Check for parent project and warn
    if let Some(parent) = cwd.parent()
        && let Ok(parent_root) = project_io::discover_project(parent)
    {
        eprintln!(
            "Note: parent project found at {}/",
            parent_root.join(project_io::WBS_DIR).display()
        );
        eprintln!("Creating new project in ./{}/", project_io::WBS_DIR);
    }

    let name = args.name.unwrap_or_else(|| {
        cwd.file_name()
            .and_then(|n| n.to_str())
            .map(infer_name)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "Untitled".to_string())
    });
    let id = args.id.unwrap_or_else(|| infer_id(&name));
    validate_project_id(&id)?;

    let project = project_io::init_project(&cwd, &render_project_toml(&name, &id), args.force)?;
    tracing::info!(root = %project.root.display(), id = %id, "initialized project");

    println!("Initialized schedule: {} ({})", name, id);
    Ok(())
}
