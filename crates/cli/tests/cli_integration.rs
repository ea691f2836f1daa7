//! CLI integration tests.
//!
//! Uses `assert_cmd` to spawn the `easel` binary against a fresh SQLite
//! database in a temp directory and verifies exit codes and output.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

/// Variables that would leak configuration from the developer's shell.
const ENV_VARS: &[&str] = &[
    "EASEL_DATABASE",
    "DATABASE_URL",
    "EASEL_PORT",
    "PORT",
    "EASEL_ORACLE",
    "EASEL_LLM_API_KEY",
    "OPENAI_API_KEY",
    "API_KEY",
    "EASEL_LLM_BASE_URL",
    "BASE_URL",
    "EASEL_LLM_MODEL",
    "MODEL_NAME",
    "EASEL_LOG_LEVEL",
];

/// Helper: an `easel` command rooted in `dir`, using `dir/scene.db`.
fn easel(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("easel");
    cmd.current_dir(dir.path());
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd.env("EASEL_LOG", "warn");
    cmd.arg("--database").arg(dir.path().join("scene.db"));
    cmd
}

/// Helper: run `easel --output json <args>` and parse stdout.
fn easel_json(dir: &TempDir, args: &[&str]) -> Value {
    let output = easel(dir)
        .arg("--output")
        .arg("json")
        .args(args)
        .output()
        .expect("failed to run easel");
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({e}): {}",
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

// ──────────────────────────────────────────────
// 1. Help, version and config
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    let dir = TempDir::new().unwrap();
    easel(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Conversational 3D scene editor"));
}

#[test]
fn version_exits_0() {
    let dir = TempDir::new().unwrap();
    easel(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("easel"));
}

#[test]
fn config_masks_api_key() {
    let dir = TempDir::new().unwrap();
    easel(&dir)
        .env("EASEL_ORACLE", "llm")
        .env("EASEL_LLM_API_KEY", "sk-very-secret-9876")
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("****9876"))
        .stdout(predicate::str::contains("sk-very-secret").not());
}

#[test]
fn config_file_is_read() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("custom.toml");
    std::fs::write(&path, "[server]\nport = 9123\n").unwrap();
    easel(&dir)
        .arg("--config")
        .arg(&path)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("port = 9123"));
}

#[test]
fn llm_oracle_without_key_fails() {
    let dir = TempDir::new().unwrap();
    easel(&dir)
        .env("EASEL_ORACLE", "llm")
        .arg("config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("API key"));
}

#[test]
fn malformed_config_file_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[server\nport = ").unwrap();
    easel(&dir)
        .arg("--config")
        .arg(&path)
        .arg("config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("could not parse"));
}

// ──────────────────────────────────────────────
// 2. Chat, undo, redo
// ──────────────────────────────────────────────

#[test]
fn chat_requires_session() {
    let dir = TempDir::new().unwrap();
    easel(&dir)
        .args(["chat", "draw a circle"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--session"));
}

#[test]
fn chat_creates_shape() {
    let dir = TempDir::new().unwrap();
    easel(&dir)
        .args(["chat", "--session", "s1", "draw a red circle with radius 3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created a red circle"));

    let shapes = easel_json(&dir, &["shapes"]);
    assert_eq!(shapes["count"], 1);
    assert_eq!(shapes["shapes"][0]["kind"], "circle");
}

#[test]
fn undo_then_redo_round_trip() {
    let dir = TempDir::new().unwrap();
    easel(&dir)
        .args(["chat", "--session", "s1", "draw a square"])
        .assert()
        .success();

    easel(&dir)
        .args(["undo", "--session", "s1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Undid"));
    assert_eq!(easel_json(&dir, &["shapes"])["count"], 0);

    let redo = easel_json(&dir, &["redo", "--session", "s1"]);
    assert_eq!(redo["success"], true);
    assert_eq!(easel_json(&dir, &["shapes"])["count"], 1);
}

#[test]
fn redo_after_new_change_restores_undone_shape() {
    let dir = TempDir::new().unwrap();
    easel(&dir)
        .args(["chat", "--session", "s1", "draw a square"])
        .assert()
        .success();
    easel(&dir)
        .args(["undo", "--session", "s1"])
        .assert()
        .success();
    easel(&dir)
        .args(["chat", "--session", "s1", "draw a circle"])
        .assert()
        .success();

    let redo = easel_json(&dir, &["redo", "--session", "s1"]);
    assert_eq!(redo["success"], true);
    assert_eq!(easel_json(&dir, &["shapes"])["count"], 2);

    easel(&dir)
        .args(["redo", "--session", "s1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to redo."));
}

#[test]
fn undo_with_empty_history() {
    let dir = TempDir::new().unwrap();
    easel(&dir)
        .args(["undo", "--session", "nobody"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to undo."));
}

#[test]
fn unrelated_message_gets_help_reply() {
    let dir = TempDir::new().unwrap();
    let outcome = easel_json(&dir, &["chat", "--session", "s1", "hello there"]);
    assert_eq!(outcome["status"], "completed");
    assert_eq!(outcome["action"], "none");
}

#[test]
fn degenerate_triangle_exits_1() {
    let dir = TempDir::new().unwrap();
    easel(&dir)
        .args(["chat", "--session", "s1", "create a triangle with sides 1, 2 and 10"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Cannot create that triangle"));
    assert_eq!(easel_json(&dir, &["shapes"])["count"], 0);
}

#[test]
fn history_lists_operations() {
    let dir = TempDir::new().unwrap();
    easel(&dir)
        .args(["chat", "--session", "s1", "draw a circle"])
        .assert()
        .success();
    easel(&dir)
        .args(["chat", "--session", "s1", "delete all circles"])
        .assert()
        .success();

    let history = easel_json(&dir, &["history", "--session", "s1"]);
    let entries = history["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["kind"], "delete");
    assert_eq!(entries[1]["kind"], "create");
}

// ──────────────────────────────────────────────
// 3. Suspension and resume
// ──────────────────────────────────────────────

#[test]
fn auto_answer_places_beside_neighbor() {
    let dir = TempDir::new().unwrap();
    easel(&dir)
        .args(["chat", "--session", "s1", "draw a circle"])
        .assert()
        .success();

    let outcome = easel_json(
        &dir,
        &["chat", "--session", "s1", "--auto-answer", "add a square next to the circle"],
    );
    assert_eq!(outcome["status"], "completed");
    assert_eq!(outcome["action"], "create");
    assert_eq!(easel_json(&dir, &["shapes"])["count"], 2);
}

#[test]
fn suspended_thread_resumes_once() {
    let dir = TempDir::new().unwrap();
    easel(&dir)
        .args(["chat", "--session", "s1", "draw a circle"])
        .assert()
        .success();

    let suspended = easel_json(
        &dir,
        &["chat", "--session", "s1", "--thread", "th-1", "add a square next to the circle"],
    );
    assert_eq!(suspended["status"], "suspended");
    assert_eq!(suspended["action"], "objects_by_kind");
    let token = suspended["resumeToken"].as_str().unwrap().to_string();

    easel(&dir)
        .args(["chat", "--session", "s1", "--thread", "th-1", "draw a circle"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("busy"));

    let resumed = easel_json(&dir, &["resume", "th-1", "--token", &token, "--auto"]);
    assert_eq!(resumed["status"], "completed");

    easel(&dir)
        .args(["resume", "th-1", "--token", &token, "--answer", "{\"shapes\": []}"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no pending suspension"));
    assert_eq!(easel_json(&dir, &["shapes"])["count"], 2);
}

#[test]
fn stale_token_rejected() {
    let dir = TempDir::new().unwrap();
    easel(&dir)
        .args(["chat", "--session", "s1", "draw a circle"])
        .assert()
        .success();
    easel(&dir)
        .args(["chat", "--session", "s1", "--thread", "th-2", "add a square next to the circle"])
        .assert()
        .success();

    easel(&dir)
        .args(["resume", "th-2", "--token", "wrong", "--answer", "{\"shapes\": []}"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("stale"));
}
