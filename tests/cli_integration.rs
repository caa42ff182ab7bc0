//! Integration tests for the civic CLI
//!
//! These tests exercise the full CLI workflow using a temporary database.
//! They verify that commands work end-to-end without mocking.

use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Helper to run civic CLI with a specific database path
fn run_civic(args: &[&str], db_path: &Path) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_civic"))
        .args(args)
        .env("CIVIC_DB_PATH", db_path)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute civic")
}

/// Helper to get stdout as string
fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Helper to get stderr as string
fn stderr(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn setup() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("civic.db");
    (dir, db)
}

fn report(db: &Path, title: &str, category: &str) -> i64 {
    let output = run_civic(
        &[
            "report",
            "--title",
            title,
            "--description",
            "Reported from the integration tests",
            "--category",
            category,
        ],
        db,
    );
    assert!(output.status.success(), "report failed: {}", stderr(&output));
    let out = stdout(&output);
    out.trim()
        .rsplit('#')
        .next()
        .and_then(|id| id.trim().parse().ok())
        .unwrap_or_else(|| panic!("no id in output: {}", out))
}

fn json(output: &std::process::Output) -> serde_json::Value {
    assert!(output.status.success(), "command failed: {}", stderr(output));
    serde_json::from_str(&stdout(output)).expect("stdout should be JSON")
}

// =============================================================================
// Basic Command Tests
// =============================================================================

#[test]
fn test_help_command() {
    let output = Command::new(env!("CARGO_BIN_EXE_civic"))
        .arg("--help")
        .output()
        .expect("Failed to execute");

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("civic"));
    assert!(out.contains("serve"));
    assert!(out.contains("export"));
}

#[test]
fn test_version_command() {
    let output = Command::new(env!("CARGO_BIN_EXE_civic"))
        .arg("--version")
        .output()
        .expect("Failed to execute");

    assert!(output.status.success());
    assert!(stdout(&output).contains("civic"));
}

#[test]
fn test_completion_bash() {
    let output = Command::new(env!("CARGO_BIN_EXE_civic"))
        .args(["completion", "bash"])
        .output()
        .expect("Failed to execute");

    assert!(
        output.status.success(),
        "completion bash failed: {}",
        stderr(&output)
    );
    assert!(
        stdout(&output).contains("_civic"),
        "bash completion should contain _civic function"
    );
}

// =============================================================================
// Issue Lifecycle Tests
// =============================================================================

#[test]
fn test_report_and_show() {
    let (_dir, db) = setup();
    let id = report(&db, "Broken streetlight on Main St", "lighting");

    let issue = json(&run_civic(&["show", &id.to_string(), "--json"], &db));
    assert_eq!(issue["id"], id);
    assert_eq!(issue["title"], "Broken streetlight on Main St");
    assert_eq!(issue["category"], "lighting");
    assert_eq!(issue["status"], "reported");
    assert_eq!(issue["priority"], "medium");
    assert!(issue["created_at"].as_str().is_some());
}

#[test]
fn test_report_rejects_unknown_category() {
    let (_dir, db) = setup();
    let output = run_civic(
        &["report", "-t", "Thing", "-d", "Stuff", "-c", "potholes"],
        &db,
    );
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Invalid category 'potholes'"));
}

#[test]
fn test_show_missing_issue_fails() {
    let (_dir, db) = setup();
    let output = run_civic(&["show", "404"], &db);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Issue not found"));
}

#[test]
fn test_update_status_and_stats() {
    let (_dir, db) = setup();
    for title in ["Pothole", "Graffiti", "Dim lamp"] {
        report(&db, title, "roads");
    }
    let busy = report(&db, "Leaking main", "water");

    let output = run_civic(
        &["update", &busy.to_string(), "--status", "in_progress", "--notes", "Crew on site"],
        &db,
    );
    assert!(output.status.success(), "update failed: {}", stderr(&output));

    let stats = json(&run_civic(&["stats", "--json"], &db));
    assert_eq!(stats["total"], 4);
    assert_eq!(stats["reported"], 3);
    assert_eq!(stats["inProgress"], 1);
    assert_eq!(stats["resolved"], 0);
    assert_eq!(stats["categories"][0]["category"], "roads");
    assert_eq!(stats["categories"][0]["count"], 3);

    let issue = json(&run_civic(&["show", &busy.to_string(), "--json"], &db));
    assert_eq!(issue["admin_notes"], "Crew on site");
}

#[test]
fn test_update_rejects_unknown_status() {
    let (_dir, db) = setup();
    let id = report(&db, "Pothole", "roads");
    let output = run_civic(&["update", &id.to_string(), "--status", "closed"], &db);
    assert!(!output.status.success());
}

#[test]
fn test_update_missing_issue_fails() {
    let (_dir, db) = setup();
    let output = run_civic(&["update", "77", "--status", "resolved"], &db);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Issue not found"));
}

#[test]
fn test_list_json_with_filters() {
    let (_dir, db) = setup();
    report(&db, "Pothole on 5th", "roads");
    report(&db, "Overflowing bin", "sanitation");
    let newest = report(&db, "Cracked kerb", "roads");

    let page = json(&run_civic(&["list", "--category", "roads", "--json"], &db));
    assert_eq!(page["total"], 2);
    assert_eq!(page["issues"][0]["id"], newest);

    let page = json(&run_civic(&["list", "--search", "BIN", "--json"], &db));
    assert_eq!(page["total"], 1);

    let page = json(&run_civic(&["list", "--limit", "1", "--page", "2", "--json"], &db));
    assert_eq!(page["total"], 3);
    assert_eq!(page["issues"].as_array().unwrap().len(), 1);
}

#[test]
fn test_list_empty() {
    let (_dir, db) = setup();
    let output = run_civic(&["list"], &db);
    assert!(output.status.success());
    assert!(stdout(&output).contains("No issues found"));
}

// =============================================================================
// Export Tests
// =============================================================================

#[test]
fn test_export_csv_to_file() {
    let (dir, db) = setup();
    report(&db, "Sign says \"STOP\"", "safety");
    report(&db, "Pothole", "roads");

    let out_file = dir.path().join("issues.csv");
    let output = run_civic(&["export", "-o", out_file.to_str().unwrap()], &db);
    assert!(output.status.success(), "export failed: {}", stderr(&output));

    let csv = std::fs::read_to_string(&out_file).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("ID,Title,Description,Category,Status,Priority"));
    assert!(csv.contains("\"Sign says \"\"STOP\"\"\""));
}

#[test]
fn test_export_csv_to_stdout_with_filter() {
    let (_dir, db) = setup();
    report(&db, "Pothole", "roads");
    report(&db, "Dark path", "lighting");

    let output = run_civic(&["export", "--category", "lighting", "-o", "-"], &db);
    assert!(output.status.success());
    let out = stdout(&output);
    assert_eq!(out.lines().count(), 2);
    assert!(out.contains("\"Dark path\""));
    assert!(!out.contains("\"Pothole\""));
}
