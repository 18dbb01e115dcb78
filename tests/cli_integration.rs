//! Integration tests for the `wbs` CLI.
//!
//! Each test creates a temp project directory, runs `wbs` as a subprocess,
//! and verifies stdout and/or the task file.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::Value;

/// Get the path to the built `wbs` binary.
fn wbs_bin() -> PathBuf {
    // cargo test builds to target/debug/
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("wbs");
    path
}

/// Create a small schedule:
///
/// ```text
/// 1    Site work
/// 1.1  Clearing
/// 1.2  Grading      <- 1.1FS+2
/// 2    Foundations  <- 1.2
/// 3    Framing      <- 2SS+3
/// ```
fn create_test_project(root: &Path) {
    let wbs_dir = root.join(".wbs");
    fs::create_dir_all(&wbs_dir).unwrap();

    fs::write(
        wbs_dir.join("project.toml"),
        r#"[project]
name = "Riverside Clinic"
id = "riverside"

[queue]
debounce_ms = 50
"#,
    )
    .unwrap();

    write_tasks(
        root,
        &[
            ("t1", "1", None, 0, ""),
            ("t2", "1.1", Some("t1"), 0, ""),
            ("t3", "1.2", Some("t1"), 1, "1.1FS+2"),
            ("t4", "2", None, 1, "1.2"),
            ("t5", "3", None, 2, "2SS+3"),
        ],
    );
}

/// (id, number, parent, order_index, comma-separated predecessors)
type Row<'a> = (&'a str, &'a str, Option<&'a str>, i64, &'a str);

fn write_tasks(root: &Path, rows: &[Row]) {
    let names = ["Site work", "Clearing", "Grading", "Foundations", "Framing"];
    let tasks: Vec<Value> = rows
        .iter()
        .enumerate()
        .map(|(i, (id, number, parent, order, preds))| {
            serde_json::json!({
                "id": id,
                "hierarchy_number": number,
                "parent_id": parent,
                "order_index": order,
                "name": names.get(i).copied().unwrap_or("Extra"),
                "predecessors": preds.split(',').filter(|p| !p.is_empty()).collect::<Vec<_>>(),
                "created_at": format!("2025-03-01T08:00:0{}Z", i),
            })
        })
        .collect();
    let table = serde_json::json!({ "riverside": tasks });
    fs::write(
        root.join(".wbs/tasks.json"),
        serde_json::to_string_pretty(&table).unwrap(),
    )
    .unwrap();
}

/// Stored (id, number, predecessors) rows sorted by number.
fn stored(root: &Path) -> Vec<(String, String, Vec<String>)> {
    let text = fs::read_to_string(root.join(".wbs/tasks.json")).unwrap();
    let table: Value = serde_json::from_str(&text).unwrap();
    let mut rows: Vec<(String, String, Vec<String>)> = table["riverside"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| {
            (
                t["id"].as_str().unwrap().to_string(),
                t["hierarchy_number"].as_str().unwrap().to_string(),
                t["predecessors"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|p| p.as_str().unwrap().to_string())
                    .collect(),
            )
        })
        .collect();
    rows.sort_by(|a, b| a.1.cmp(&b.1));
    rows
}

fn row(id: &str, number: &str, preds: &[&str]) -> (String, String, Vec<String>) {
    (
        id.to_string(),
        number.to_string(),
        preds.iter().map(|p| p.to_string()).collect(),
    )
}

/// Run `wbs` with the given args in the given directory, returning (stdout, stderr, success).
fn run_wbs(dir: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(wbs_bin())
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to run wbs");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

/// Run `wbs` expecting success, return stdout.
fn run_wbs_ok(dir: &Path, args: &[&str]) -> String {
    let (stdout, stderr, success) = run_wbs(dir, args);
    if !success {
        panic!(
            "wbs {:?} failed:\nstdout: {}\nstderr: {}",
            args, stdout, stderr
        );
    }
    stdout
}

// ---------------------------------------------------------------------------
// Init
// ---------------------------------------------------------------------------

#[test]
fn test_init_creates_project() {
    let tmp = tempfile::TempDir::new().unwrap();
    let dir = tmp.path().join("tower-b");
    fs::create_dir(&dir).unwrap();

    let out = run_wbs_ok(&dir, &["init"]);
    assert!(out.contains("Tower B (tower-b)"));
    let toml = fs::read_to_string(dir.join(".wbs/project.toml")).unwrap();
    assert!(toml.contains("id = \"tower-b\""));

    // empty schedule
    let list = run_wbs_ok(&dir, &["list"]);
    assert!(list.contains("No tasks"));
}

#[test]
fn test_init_with_project_dir_flag() {
    let tmp = tempfile::TempDir::new().unwrap();
    let dir = tmp.path().join("annex");
    fs::create_dir(&dir).unwrap();

    run_wbs_ok(tmp.path(), &["-C", "annex", "init"]);
    assert!(dir.join(".wbs/project.toml").exists());
    let list = run_wbs_ok(tmp.path(), &["-C", "annex", "list"]);
    assert!(list.contains("No tasks"));
}

#[test]
fn test_init_refuses_existing_project() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_project(tmp.path());
    let (_, stderr, success) = run_wbs(tmp.path(), &["init"]);
    assert!(!success);
    assert!(stderr.contains("already exists"));
}

// ---------------------------------------------------------------------------
// Read commands
// ---------------------------------------------------------------------------

#[test]
fn test_list_outline() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_project(tmp.path());
    let out = run_wbs_ok(tmp.path(), &["list"]);
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(
        lines,
        vec![
            "1  Site work",
            "  1.1  Clearing",
            "  1.2  Grading",
            "2  Foundations",
            "3  Framing",
        ]
    );
}

#[test]
fn test_list_depth_and_deps() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_project(tmp.path());
    let out = run_wbs_ok(tmp.path(), &["list", "--depth", "1", "--deps"]);
    assert!(!out.contains("Clearing"));
    assert!(out.contains("2  Foundations  <- 1.2"));
}

#[test]
fn test_list_json() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_project(tmp.path());
    let out = run_wbs_ok(tmp.path(), &["list", "--json"]);
    let tasks: Value = serde_json::from_str(&out).unwrap();
    let numbers: Vec<&str> = tasks
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["hierarchy_number"].as_str().unwrap())
        .collect();
    assert_eq!(numbers, vec!["1", "1.1", "1.2", "2", "3"]);
}

#[test]
fn test_show_by_number_and_id() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_project(tmp.path());
    let by_number = run_wbs_ok(tmp.path(), &["show", "1.2"]);
    assert!(by_number.contains("1.2  Grading"));
    assert!(by_number.contains("predecessors: 1.1FS+2"));

    let by_id = run_wbs_ok(tmp.path(), &["show", "t3"]);
    assert_eq!(by_id, by_number);
}

#[test]
fn test_show_not_found() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_project(tmp.path());
    let (_, stderr, success) = run_wbs(tmp.path(), &["show", "9.9"]);
    assert!(!success);
    assert!(stderr.contains("task not found: 9.9"));
}

#[test]
fn test_check_valid() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_project(tmp.path());
    let out = run_wbs_ok(tmp.path(), &["check"]);
    assert!(out.contains("Schedule is valid."));
}

#[test]
fn test_check_json_reports_dangling_reference() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_project(tmp.path());
    write_tasks(
        tmp.path(),
        &[("t1", "1", None, 0, ""), ("t2", "2", None, 1, "7FS")],
    );
    let out = run_wbs_ok(tmp.path(), &["check", "--json"]);
    let result: Value = serde_json::from_str(&out).unwrap();
    let errors = result["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].to_string().contains("7FS"));
}

#[test]
fn test_project_dir_flag() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_project(tmp.path());
    let elsewhere = tempfile::TempDir::new().unwrap();
    let dir = tmp.path().to_str().unwrap();
    let out = run_wbs_ok(elsewhere.path(), &["-C", dir, "list"]);
    assert!(out.contains("Foundations"));
}

// ---------------------------------------------------------------------------
// Structural edits
// ---------------------------------------------------------------------------

#[test]
fn test_rm_first_child_drops_references() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_project(tmp.path());
    let out = run_wbs_ok(tmp.path(), &["rm", "1.1"]);
    assert!(out.contains("deleted 1.1  Clearing"));

    assert_eq!(
        stored(tmp.path()),
        vec![
            row("t1", "1", &[]),
            row("t3", "1.1", &[]),
            row("t4", "2", &["1.1"]),
            row("t5", "3", &["2SS+3"]),
        ]
    );
}

#[test]
fn test_rm_retargets_to_preceding_sibling() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_project(tmp.path());
    run_wbs_ok(tmp.path(), &["rm", "2"]);

    assert_eq!(
        stored(tmp.path()),
        vec![
            row("t1", "1", &[]),
            row("t2", "1.1", &[]),
            row("t3", "1.2", &["1.1FS+2"]),
            row("t5", "2", &["1SS+3"]),
        ]
    );
}

#[test]
fn test_rm_subtree() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_project(tmp.path());
    let out = run_wbs_ok(tmp.path(), &["rm", "1"]);
    assert!(out.contains("and 2 subtasks"));

    // 2 referenced 1.2 and has no preceding sibling to fall back on
    assert_eq!(
        stored(tmp.path()),
        vec![row("t4", "1", &[]), row("t5", "2", &["1SS+3"])]
    );
}

#[test]
fn test_add_at_top_shifts_numbers() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_project(tmp.path());
    let out = run_wbs_ok(tmp.path(), &["add", "Permits", "--top"]);
    assert!(out.contains("added 1  Permits"));

    let rows = stored(tmp.path());
    let numbers: Vec<&str> = rows.iter().map(|r| r.1.as_str()).collect();
    assert_eq!(numbers, vec!["1", "2", "2.1", "2.2", "3", "4"]);
    assert_eq!(rows[3], row("t3", "2.2", &["2.1FS+2"]));
    assert_eq!(rows[4], row("t4", "3", &["2.2"]));
    assert_eq!(rows[5], row("t5", "4", &["3SS+3"]));
}

#[test]
fn test_add_under_parent_json() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_project(tmp.path());
    let out = run_wbs_ok(tmp.path(), &["add", "Rebar", "--under", "2", "--json"]);
    let result: Value = serde_json::from_str(&out).unwrap();
    assert_eq!(result["action"], "added");
    assert_eq!(result["task"]["hierarchy_number"], "2.1");
    assert_eq!(result["task"]["parent_id"], "t4");
    assert_eq!(result["renumbered"].as_array().unwrap().len(), 0);
}

#[test]
fn test_mv_top_rewrites_references() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_project(tmp.path());
    run_wbs_ok(tmp.path(), &["mv", "2", "--top"]);

    assert_eq!(
        stored(tmp.path()),
        vec![
            row("t4", "1", &["2.2"]),
            row("t1", "2", &[]),
            row("t2", "2.1", &[]),
            row("t3", "2.2", &["2.1FS+2"]),
            row("t5", "3", &["1SS+3"]),
        ]
    );
    run_wbs_ok(tmp.path(), &["check"]);
}

#[test]
fn test_mv_requires_position() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_project(tmp.path());
    let (_, stderr, success) = run_wbs(tmp.path(), &["mv", "2"]);
    assert!(!success);
    assert!(stderr.contains("--top"));
}

#[test]
fn test_indent_then_outdent() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_project(tmp.path());
    run_wbs_ok(tmp.path(), &["indent", "3"]);
    let rows = stored(tmp.path());
    assert_eq!(rows[4], row("t5", "2.1", &["2SS+3"]));

    run_wbs_ok(tmp.path(), &["outdent", "2.1"]);
    let rows = stored(tmp.path());
    assert_eq!(rows[4], row("t5", "3", &["2SS+3"]));
}

#[test]
fn test_indent_first_task_fails() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_project(tmp.path());
    let (_, _, success) = run_wbs(tmp.path(), &["indent", "1"]);
    assert!(!success);
}

// ---------------------------------------------------------------------------
// Field edits
// ---------------------------------------------------------------------------

#[test]
fn test_dep_add_and_rm() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_project(tmp.path());
    let out = run_wbs_ok(tmp.path(), &["dep", "3", "add", "1.2FF-1"]);
    assert!(out.contains("3 dep add"));
    assert_eq!(stored(tmp.path())[4], row("t5", "3", &["2SS+3", "1.2FF-1"]));

    run_wbs_ok(tmp.path(), &["dep", "3", "rm", "2"]);
    assert_eq!(stored(tmp.path())[4], row("t5", "3", &["1.2FF-1"]));
}

#[test]
fn test_dep_add_rejects_self_reference() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_project(tmp.path());
    let (_, _, success) = run_wbs(tmp.path(), &["dep", "3", "add", "3"]);
    assert!(!success);
    assert_eq!(stored(tmp.path())[4], row("t5", "3", &["2SS+3"]));
}

#[test]
fn test_edit_fields() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_project(tmp.path());
    run_wbs_ok(
        tmp.path(),
        &["edit", "1.1", "--progress", "50", "--start", "2025-04-01", "--resource", "crew-a"],
    );
    let detail = run_wbs_ok(tmp.path(), &["show", "1.1"]);
    assert!(detail.contains("progress: 50%"));
    assert!(detail.contains("start: 2025-04-01"));
    assert!(detail.contains("resources: crew-a"));
}

#[test]
fn test_edit_replaces_predecessor_list() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_project(tmp.path());
    run_wbs_ok(tmp.path(), &["edit", "2", "--predecessors", "1.1, 1.2SS+1"]);
    assert_eq!(stored(tmp.path())[3], row("t4", "2", &["1.1", "1.2SS+1"]));
}

// ---------------------------------------------------------------------------
// Maintenance
// ---------------------------------------------------------------------------

#[test]
fn test_renumber_dry_run_then_apply() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_project(tmp.path());
    write_tasks(
        tmp.path(),
        &[
            ("t1", "1", None, 0, ""),
            ("t2", "4", None, 1, ""),
            ("t3", "9", None, 2, "4FS+1"),
        ],
    );

    let preview = run_wbs_ok(tmp.path(), &["renumber", "--dry-run"]);
    assert!(preview.contains("4 -> 2"));
    assert!(preview.contains("9 -> 3"));
    // nothing written
    assert_eq!(stored(tmp.path())[1].1, "4");

    let out = run_wbs_ok(tmp.path(), &["renumber", "--json"]);
    let result: Value = serde_json::from_str(&out).unwrap();
    assert_eq!(result["needed"], true);
    assert_eq!(result["renumbered"], 2);
    assert_eq!(result["references_rewritten"], 1);
    assert_eq!(
        stored(tmp.path()),
        vec![row("t1", "1", &[]), row("t2", "2", &[]), row("t3", "3", &["2FS+1"])]
    );

    let again = run_wbs_ok(tmp.path(), &["renumber"]);
    assert!(again.contains("numbering is canonical"));
}

#[test]
fn test_repair_self_reference() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_project(tmp.path());
    write_tasks(
        tmp.path(),
        &[("t1", "1", None, 0, ""), ("t2", "2", None, 1, "2SS")],
    );
    let out = run_wbs_ok(tmp.path(), &["repair"]);
    assert!(out.contains("1 fixed, 0 unresolved"));
    assert_eq!(stored(tmp.path())[1], row("t2", "2", &["1SS"]));
}

#[test]
fn test_config_set() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_project(tmp.path());
    run_wbs_ok(tmp.path(), &["config", "set", "schedule.deletion_policy", "drop"]);
    let toml = fs::read_to_string(tmp.path().join(".wbs/project.toml")).unwrap();
    assert!(toml.contains("deletion_policy = \"drop\""));
    // comments and other keys survive
    assert!(toml.contains("debounce_ms = 50"));

    // with drop, deleting 2 also drops 3's reference to it
    run_wbs_ok(tmp.path(), &["rm", "2"]);
    assert_eq!(stored(tmp.path())[3], row("t5", "2", &[]));
}

#[test]
fn test_config_set_rejects_unknown_key() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_project(tmp.path());
    let (_, _, success) = run_wbs(tmp.path(), &["config", "set", "queue.retries", "3"]);
    assert!(!success);
}
