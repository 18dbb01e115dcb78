use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "wbs", about = concat!("wbs v", env!("CARGO_PKG_VERSION"), " - outline numbering and dependencies for construction schedules"), version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Run against a different project directory
    #[arg(short = 'C', long = "project-dir", global = true)]
    pub project_dir: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new schedule in the current directory
    Init(InitArgs),
    /// List tasks in outline order
    List(ListArgs),
    /// Show task details
    Show(ShowArgs),
    /// Validate numbering and predecessor references
    Check,
    /// Add a task
    Add(AddArgs),
    /// Delete a task and its subtasks
    Rm(RmArgs),
    /// Reorder a task among its siblings
    Mv(MvArgs),
    /// Make a task a child of its preceding sibling
    Indent(TaskArg),
    /// Make a task a sibling of its parent
    Outdent(TaskArg),
    /// Add or remove predecessors
    Dep(DepArgs),
    /// Edit task fields
    Edit(EditArgs),
    /// Renumber the schedule if numbering is not canonical
    Renumber(RenumberArgs),
    /// Point self-referencing predecessors at the preceding sibling
    Repair,
    /// Change project settings
    Config(ConfigCmd),
}

// ---------------------------------------------------------------------------
// Init args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct InitArgs {
    /// Project name (default: inferred from directory name)
    #[arg(long)]
    pub name: Option<String>,
    /// Project id used to scope task rows (default: derived from the name)
    #[arg(long)]
    pub id: Option<String>,
    /// Reinitialize even if .wbs/ already exists (clears all tasks)
    #[arg(long)]
    pub force: bool,
}

// ---------------------------------------------------------------------------
// Read command args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct ListArgs {
    /// Only show tasks up to this depth (1 = top level)
    #[arg(long)]
    pub depth: Option<usize>,
    /// Show predecessors after each task
    #[arg(long)]
    pub deps: bool,
}

#[derive(Args)]
pub struct ShowArgs {
    /// Task id or hierarchy number
    pub task: String,
}

// ---------------------------------------------------------------------------
// Write command args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct TaskArg {
    /// Task id or hierarchy number
    pub task: String,
}

#[derive(Args)]
pub struct AddArgs {
    /// Task name
    pub name: String,
    /// Parent task (id or number); default is top level
    #[arg(long)]
    pub under: Option<String>,
    /// Insert as first child instead of last
    #[arg(long, conflicts_with = "after")]
    pub top: bool,
    /// Insert right after this sibling
    #[arg(long)]
    pub after: Option<String>,
}

#[derive(Args)]
pub struct RmArgs {
    /// Task id or hierarchy number
    pub task: String,
}

#[derive(Args)]
pub struct MvArgs {
    /// Task id or hierarchy number
    pub task: String,
    /// Move to first position
    #[arg(long, conflicts_with_all = ["bottom", "after"])]
    pub top: bool,
    /// Move to last position
    #[arg(long, conflicts_with = "after")]
    pub bottom: bool,
    /// Move right after this sibling
    #[arg(long)]
    pub after: Option<String>,
}

#[derive(Args)]
pub struct DepArgs {
    /// Task id or hierarchy number
    pub task: String,
    /// add or rm
    pub action: String,
    /// Reference to add (e.g. 4.2FS+2), or target number to remove
    pub reference: String,
}

#[derive(Args)]
pub struct EditArgs {
    /// Task id or hierarchy number
    pub task: String,
    #[arg(long)]
    pub name: Option<String>,
    /// Start date (YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<chrono::NaiveDate>,
    /// End date (YYYY-MM-DD)
    #[arg(long)]
    pub end: Option<chrono::NaiveDate>,
    /// Duration in days
    #[arg(long)]
    pub duration: Option<i64>,
    /// Progress, 0-100
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub progress: Option<u8>,
    /// Replace resources (repeatable)
    #[arg(long = "resource")]
    pub resources: Vec<String>,
    /// Replace the predecessor list, e.g. "1, 2.3SS+1"
    #[arg(long)]
    pub predecessors: Option<String>,
}

#[derive(Args)]
pub struct RenumberArgs {
    /// Report what would change without writing
    #[arg(long)]
    pub dry_run: bool,
    /// Derive parent links and sibling order from the existing numbers first
    #[arg(long)]
    pub infer_parents: bool,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct ConfigCmd {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Set a config value (project.name, queue.debounce_ms, schedule.deletion_policy)
    Set {
        key: String,
        value: String,
    },
}
