mod init;
pub use init::cmd_init;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Global override for project directory (set by -C flag)
static PROJECT_DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);

use crate::cli::commands::*;
use crate::cli::output::*;
use crate::io::config_io;
use crate::io::project_io::{self, ProjectError};
use crate::model::project::Project;
use crate::model::task::{Task, TaskFields};
use crate::ops::check;
use crate::ops::queue::FlushOutcome;
use crate::ops::remap::remap_predecessors;
use crate::ops::renumber::{numbering_diff, renumber};
use crate::ops::session::{EditOutcome, EditSession};
use crate::ops::task_ops::{InsertPosition, resolve_task};
use crate::parse::{hierarchy, parse_reference_list};
use crate::store::{FileStore, TaskStore};

type CmdResult = Result<(), Box<dyn std::error::Error>>;

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn dispatch(cli: Cli) -> CmdResult {
    let json = cli.json;

    // Store -C override for load_project_cwd()
    if let Some(ref dir) = cli.project_dir {
        let abs = std::fs::canonicalize(dir)
            .map_err(|e| format!("cannot resolve -C path '{}': {}", dir, e))?;
        PROJECT_DIR_OVERRIDE
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(abs);
    }

    match cli.command {
        // Creates the project, so runs without discovery
        Commands::Init(args) => cmd_init(args, cli.project_dir.as_deref()),

        // Read commands
        Commands::List(args) => cmd_list(args, json),
        Commands::Show(args) => cmd_show(args, json),
        Commands::Check => cmd_check(json),

        // Structural edits
        Commands::Add(args) => cmd_add(args, json),
        Commands::Rm(args) => cmd_rm(args, json),
        Commands::Mv(args) => cmd_mv(args, json),
        Commands::Indent(args) => cmd_indent(args, json),
        Commands::Outdent(args) => cmd_outdent(args, json),

        // Field edits
        Commands::Dep(args) => cmd_dep(args),
        Commands::Edit(args) => cmd_edit(args),

        // Maintenance
        Commands::Renumber(args) => cmd_renumber(args, json),
        Commands::Repair => cmd_repair(json),
        Commands::Config(args) => cmd_config(args),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load_project_cwd() -> Result<Project, ProjectError> {
    let override_dir = PROJECT_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .clone();
    let start = match override_dir {
        Some(dir) => dir,
        None => std::env::current_dir().map_err(ProjectError::IoError)?,
    };
    let root = project_io::discover_project(&start)?;
    project_io::load_project(&root)
}

fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
}

/// Run a command body on a fresh current-thread runtime.
fn block_on<F>(body: F) -> CmdResult
where
    F: Future<Output = CmdResult>,
{
    runtime()?.block_on(body)
}

fn store_for(project: &Project) -> Arc<dyn TaskStore> {
    Arc::new(FileStore::new(&project.wbs_dir))
}

fn load_tasks(project: &Project) -> Result<Vec<Task>, Box<dyn std::error::Error>> {
    Ok(runtime()?.block_on(store_for(project).select_tasks(project.id()))?)
}

/// Resolve a task given by id or hierarchy number to its id.
fn task_id(tasks: &[Task], key: &str) -> Result<String, Box<dyn std::error::Error>> {
    resolve_task(tasks, key)
        .map(|t| t.id.clone())
        .ok_or_else(|| format!("task not found: {}", key).into())
}

fn find_task<'a>(tasks: &'a [Task], id: &str) -> Option<&'a Task> {
    tasks.iter().find(|t| t.id == id)
}

/// Write back queued field edits; a failed write is an error at the CLI.
async fn close_session(session: EditSession) -> CmdResult {
    match session.close().await {
        FlushOutcome::Requeued(n) => Err(format!("could not write {} field edits", n).into()),
        FlushOutcome::Idle | FlushOutcome::Written(_) => Ok(()),
    }
}

fn print_edit(action: &str, outcome: &EditOutcome, task: Option<&Task>, json: bool) -> CmdResult {
    let change = &outcome.change;
    if json {
        let out = EditJson {
            action,
            task,
            renumbered: &change.numbering.updates,
            references_rewritten: change.predecessor_updates.len(),
            commit: &outcome.commit,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if let Some(task) = task {
        println!("{} {}  {}", action, task.hierarchy_number, task.name);
    } else {
        println!("{}", action);
    }
    if !change.numbering.is_empty() {
        println!(
            "  renumbered {} tasks, rewrote predecessors on {}",
            change.numbering.updates.len(),
            change.predecessor_updates.len()
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Read command handlers
// ---------------------------------------------------------------------------

fn cmd_list(args: ListArgs, json: bool) -> CmdResult {
    let project = load_project_cwd()?;
    let tasks = load_tasks(&project)?;

    let shown: Vec<&Task> = outline_order(&tasks)
        .into_iter()
        .filter(|t| {
            args.depth
                .is_none_or(|d| hierarchy::depth(&t.hierarchy_number) < d)
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&shown)?);
    } else if shown.is_empty() {
        println!("No tasks. Add one with `wbs add <name>`.");
    } else {
        for task in shown {
            println!("{}", format_task_line(task, args.deps));
        }
    }
    Ok(())
}

fn cmd_show(args: ShowArgs, json: bool) -> CmdResult {
    let project = load_project_cwd()?;
    let tasks = load_tasks(&project)?;
    let task = resolve_task(&tasks, &args.task).ok_or_else(|| format!("task not found: {}", args.task))?;

    if json {
        println!("{}", serde_json::to_string_pretty(task)?);
    } else {
        for line in format_task_detail(task) {
            println!("{}", line);
        }
    }
    Ok(())
}

fn cmd_check(json: bool) -> CmdResult {
    let project = load_project_cwd()?;
    let tasks = load_tasks(&project)?;
    let result = check::check_project(&tasks);

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        for line in format_check(&result) {
            println!("{}", line);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Structural edit handlers
// ---------------------------------------------------------------------------

fn cmd_add(args: AddArgs, json: bool) -> CmdResult {
    let project = load_project_cwd()?;
    block_on(async {
        let mut session = EditSession::open(store_for(&project), &project.config).await?;
        let parent = match args.under {
            Some(ref key) => Some(task_id(session.tasks(), key)?),
            None => None,
        };
        let position = if args.top {
            InsertPosition::Top
        } else if let Some(ref key) = args.after {
            InsertPosition::After(task_id(session.tasks(), key)?)
        } else {
            InsertPosition::Bottom
        };

        let outcome = session.add_task(parent.as_deref(), position, args.name).await?;
        print_edit("added", &outcome, outcome.change.inserted.as_ref(), json)?;
        close_session(session).await
    })
}

fn cmd_rm(args: RmArgs, json: bool) -> CmdResult {
    let project = load_project_cwd()?;
    block_on(async {
        let mut session = EditSession::open(store_for(&project), &project.config).await?;
        let id = task_id(session.tasks(), &args.task)?;
        let removed = find_task(session.tasks(), &id).cloned();

        let outcome = session.delete_task(&id).await?;
        print_edit("deleted", &outcome, removed.as_ref(), json)?;
        let subtasks = outcome.change.deleted.len().saturating_sub(1);
        if subtasks > 0 && !json {
            println!("  and {} subtasks", subtasks);
        }
        close_session(session).await
    })
}

fn cmd_mv(args: MvArgs, json: bool) -> CmdResult {
    let project = load_project_cwd()?;
    block_on(async {
        let mut session = EditSession::open(store_for(&project), &project.config).await?;
        let id = task_id(session.tasks(), &args.task)?;
        let position = if args.top {
            InsertPosition::Top
        } else if let Some(ref key) = args.after {
            InsertPosition::After(task_id(session.tasks(), key)?)
        } else if args.bottom {
            InsertPosition::Bottom
        } else {
            return Err("specify one of --top, --bottom, --after <task>".into());
        };

        let outcome = session.move_task(&id, position).await?;
        print_edit("moved", &outcome, find_task(session.tasks(), &id), json)?;
        close_session(session).await
    })
}

fn cmd_indent(args: TaskArg, json: bool) -> CmdResult {
    let project = load_project_cwd()?;
    block_on(async {
        let mut session = EditSession::open(store_for(&project), &project.config).await?;
        let id = task_id(session.tasks(), &args.task)?;
        let outcome = session.indent(&id).await?;
        print_edit("indented", &outcome, find_task(session.tasks(), &id), json)?;
        close_session(session).await
    })
}

fn cmd_outdent(args: TaskArg, json: bool) -> CmdResult {
    let project = load_project_cwd()?;
    block_on(async {
        let mut session = EditSession::open(store_for(&project), &project.config).await?;
        let id = task_id(session.tasks(), &args.task)?;
        let outcome = session.outdent(&id).await?;
        print_edit("outdented", &outcome, find_task(session.tasks(), &id), json)?;
        close_session(session).await
    })
}

// ---------------------------------------------------------------------------
// Field edit handlers
// ---------------------------------------------------------------------------

fn cmd_dep(args: DepArgs) -> CmdResult {
    let project = load_project_cwd()?;
    block_on(async {
        let mut session = EditSession::open(store_for(&project), &project.config).await?;
        let id = task_id(session.tasks(), &args.task)?;

        match args.action.as_str() {
            "add" => session.add_predecessor(&id, &args.reference)?,
            "rm" => session.remove_predecessor(&id, &args.reference)?,
            other => return Err(format!("unknown action '{}' (expected: add, rm)", other).into()),
        }

        let number = find_task(session.tasks(), &id)
            .map(|t| t.hierarchy_number.clone())
            .unwrap_or_default();
        close_session(session).await?;
        println!("{} dep {} {}", number, args.action, args.reference);
        Ok(())
    })
}

fn cmd_edit(args: EditArgs) -> CmdResult {
    let project = load_project_cwd()?;
    let predecessors = match args.predecessors {
        Some(ref list) => Some(
            parse_reference_list(list)?
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>(),
        ),
        None => None,
    };
    let fields = TaskFields {
        name: args.name,
        start_date: args.start,
        end_date: args.end,
        duration_days: args.duration,
        progress_percent: args.progress,
        resources: (!args.resources.is_empty()).then_some(args.resources),
        predecessors,
    };
    if fields.is_empty() {
        return Err("nothing to change; pass at least one field flag".into());
    }

    block_on(async {
        let mut session = EditSession::open(store_for(&project), &project.config).await?;
        let id = task_id(session.tasks(), &args.task)?;
        session.edit_fields(&id, fields)?;
        let number = find_task(session.tasks(), &id)
            .map(|t| t.hierarchy_number.clone())
            .unwrap_or_default();
        close_session(session).await?;
        println!("{} updated", number);
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// Maintenance handlers
// ---------------------------------------------------------------------------

fn cmd_renumber(args: RenumberArgs, json: bool) -> CmdResult {
    let project = load_project_cwd()?;
    block_on(async {
        let mut session = EditSession::open(store_for(&project), &project.config).await?;
        if args.infer_parents {
            let changed = session.adopt_numbering().await?;
            if !json {
                println!("derived parents for {} tasks", changed);
            }
        }

        if args.dry_run {
            let tasks = session.tasks();
            let needed = check::needs_normalization(tasks);
            let diff = numbering_diff(tasks, &renumber(tasks));
            let rewritten = remap_predecessors(tasks, &diff.old_to_new).len();
            if json {
                let out = RenumberJson {
                    needed,
                    dry_run: true,
                    updates: &diff.updates,
                    references_rewritten: rewritten,
                };
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else if !needed {
                println!("numbering is canonical");
            } else {
                for update in &diff.updates {
                    let old = find_task(tasks, &update.id)
                        .map(|t| t.hierarchy_number.as_str())
                        .unwrap_or("?");
                    println!("{} -> {}", old, update.hierarchy_number);
                }
                println!("{} predecessor lists would change", rewritten);
            }
            return Ok(());
        }

        let outcome = session.normalize().await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        } else if outcome.needed {
            println!(
                "renumbered {} tasks, rewrote predecessors on {}",
                outcome.renumbered, outcome.references_rewritten
            );
        } else {
            println!("numbering is canonical");
        }
        close_session(session).await
    })
}

fn cmd_repair(json: bool) -> CmdResult {
    let project = load_project_cwd()?;
    block_on(async {
        let mut session = EditSession::open(store_for(&project), &project.config).await?;
        let report = session.repair().await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            for line in format_repair(&report) {
                println!("{}", line);
            }
        }
        close_session(session).await
    })
}

fn cmd_config(args: ConfigCmd) -> CmdResult {
    let project = load_project_cwd()?;
    match args.action {
        ConfigAction::Set { key, value } => {
            let (_, mut doc) = config_io::read_config(&project.wbs_dir)?;
            config_io::set_value(&mut doc, &key, &value)?;
            config_io::write_config(&project.wbs_dir, &doc)?;
            println!("{} = {}", key, value);
        }
    }
    Ok(())
}
