//! Basic CLI E2E tests.
//!
//! Tests invoke CLI commands via cargo run against an isolated home
//! directory and verify outputs.

use std::path::Path;
use std::process::Command;

/// Run a CLI command with its config/database under `home`.
fn run_cli(home: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new("cargo")
        .args(["run", "-p", "studytimer-cli", "--quiet", "--"])
        .args(args)
        .env("HOME", home)
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

#[test]
fn test_config_show() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, stderr, code) = run_cli(home.path(), &["config", "show"]);
    assert_eq!(code, 0, "config show failed: {stderr}");
    assert!(stdout.contains("[timer]"));
    assert!(stdout.contains("action_min = 25"));
}

#[test]
fn test_config_set_defaults() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(
        home.path(),
        &["config", "set-defaults", "--action", "50", "--reps", "2"],
    );
    assert_eq!(code, 0);
    assert!(stdout.contains("action_min = 50"));

    let (stdout, _, code) = run_cli(home.path(), &["config", "show"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("action_min = 50"));
    assert!(stdout.contains("repetitions = 2"));
}

#[test]
fn test_session_start_and_status() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, stderr, code) = run_cli(
        home.path(),
        &[
            "session", "start", "--subject", "Math", "--lesson", "Calculus I",
        ],
    );
    assert_eq!(code, 0, "session start failed: {stderr}");
    let event: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(event["type"], "phase_started");
    assert_eq!(event["phase"], "action");

    let (stdout, _, code) = run_cli(home.path(), &["session", "status"]);
    assert_eq!(code, 0);
    let state: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(state["type"], "state_snapshot");
    assert_eq!(state["status"], "running");
}

#[test]
fn test_session_start_rejects_short_subject() {
    let home = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(
        home.path(),
        &["session", "start", "--subject", "M", "--lesson", "Calculus I"],
    );
    assert_ne!(code, 0);
    assert!(stderr.contains("subject"));
}

#[test]
fn test_session_pause_resume_cancel() {
    let home = tempfile::tempdir().unwrap();
    let (_, _, code) = run_cli(
        home.path(),
        &["session", "start", "--subject", "Math", "--lesson", "Limits"],
    );
    assert_eq!(code, 0);

    let (stdout, _, code) = run_cli(home.path(), &["session", "pause"]);
    assert_eq!(code, 0);
    let event: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(event["type"], "timer_paused");

    let (stdout, _, code) = run_cli(home.path(), &["session", "resume"]);
    assert_eq!(code, 0);
    let event: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(event["type"], "timer_resumed");

    let (stdout, _, code) = run_cli(home.path(), &["session", "cancel"]);
    assert_eq!(code, 0);
    let event: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(event["type"], "session_cancelled");

    // Cancelled session is gone; status falls back to uninitialized.
    let (stdout, _, code) = run_cli(home.path(), &["session", "status"]);
    assert_eq!(code, 0);
    let state: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(state["status"], "uninitialized");
}

#[test]
fn test_history_after_cancel() {
    let home = tempfile::tempdir().unwrap();
    let (_, _, code) = run_cli(
        home.path(),
        &["session", "start", "--subject", "History", "--lesson", "Unit 1"],
    );
    assert_eq!(code, 0);
    let (_, _, code) = run_cli(home.path(), &["session", "cancel"]);
    assert_eq!(code, 0);

    let (stdout, _, code) = run_cli(home.path(), &["history", "--status", "cancelled"]);
    assert_eq!(code, 0);
    let page: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["subject"], "History");
}

#[test]
fn test_stats_today() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, stderr, code) = run_cli(home.path(), &["stats", "today"]);
    assert_eq!(code, 0, "stats today failed: {stderr}");
    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["totals"]["sessions"], 0);
}

#[test]
fn test_stats_all() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(home.path(), &["stats", "all"]);
    assert_eq!(code, 0);
    assert!(serde_json::from_str::<serde_json::Value>(&stdout).is_ok());
}

#[test]
fn test_session_status_without_session() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(home.path(), &["session", "status"]);
    assert_eq!(code, 0);
    let state: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(state["status"], "uninitialized");
}
