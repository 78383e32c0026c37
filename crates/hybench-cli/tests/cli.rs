//! E2E tests for the commands that need no network:
//! `hybench summarize`, `hybench check --no-probe`, `hybench completions`,
//! and credential failures from `hybench eval`.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const CREDENTIAL_VARS: [&str; 6] = [
    "AZURE_SEARCH_SERVICE_NAME",
    "AZURE_SEARCH_API_KEY",
    "AZURE_SEARCH_INDEX_NAME",
    "AZURE_OPENAI_ENDPOINT",
    "AZURE_OPENAI_KEY",
    "COHERE_API_KEY",
];

// ---------------------------------------------------------------------------
// Test harness helpers
// ---------------------------------------------------------------------------

fn hybench(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("hybench"));
    cmd.current_dir(dir);
    cmd.env("HYBENCH_LOG", "error");
    cmd.env_remove("HYBENCH_FORMAT");
    cmd.env_remove("HYBENCH_TIMING");
    for var in CREDENTIAL_VARS {
        cmd.env_remove(var);
    }
    cmd
}

fn record(row: usize, matched_at_5: bool, matched_at_10: bool) -> Value {
    json!({
        "key": format!("row:{row:032}"),
        "row": row,
        "query": format!("question {row}"),
        "expected": ["12"],
        "cutoffs": [
            {"k": 5, "pages": ["3"], "matched": matched_at_5, "ndcg": if matched_at_5 { 1.0 } else { 0.0 }},
            {"k": 10, "pages": ["3", "12"], "matched": matched_at_10, "ndcg": if matched_at_10 { 0.5 } else { 0.0 }}
        ],
        "degraded": row == 2,
        "evaluated_at": "2026-03-01T12:00:00Z"
    })
}

fn write_checkpoint(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("gold.checkpoint.jsonl");
    let lines: Vec<String> = [
        record(0, true, true),
        record(1, false, true),
        record(2, false, false),
        record(3, false, false),
    ]
    .iter()
    .map(Value::to_string)
    .collect();
    fs::write(&path, lines.join("\n") + "\n").unwrap();
    path
}

// ---------------------------------------------------------------------------
// summarize
// ---------------------------------------------------------------------------

#[test]
fn summarize_json_uses_stored_cutoffs() {
    let dir = TempDir::new().unwrap();
    let checkpoint = write_checkpoint(dir.path());

    let output = hybench(dir.path())
        .args(["summarize", "--format", "json"])
        .arg(&checkpoint)
        .output()
        .expect("summarize should not crash");
    assert!(
        output.status.success(),
        "summarize failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let json: Value = serde_json::from_slice(&output.stdout).expect("valid JSON from summarize");
    assert_eq!(json["records"], 4);
    assert_eq!(json["summary"]["evaluated"], 4);
    assert_eq!(json["summary"]["degraded"], 1);
    let cutoffs = json["summary"]["cutoffs"].as_array().unwrap();
    assert_eq!(cutoffs.len(), 2);
    assert_eq!(cutoffs[0]["k"], 5);
    assert_eq!(cutoffs[0]["matches"], 1);
    assert!((cutoffs[0]["accuracy"].as_f64().unwrap() - 0.25).abs() < 1e-9);
    assert_eq!(cutoffs[1]["matches"], 2);
    assert!((cutoffs[1]["accuracy"].as_f64().unwrap() - 0.5).abs() < 1e-9);
}

#[test]
fn summarize_writes_accuracy_table_for_requested_cutoffs() {
    let dir = TempDir::new().unwrap();
    let checkpoint = write_checkpoint(dir.path());
    let accuracy = dir.path().join("acc.csv");

    hybench(dir.path())
        .args(["summarize", "--format", "text", "--cutoffs", "10"])
        .arg(&checkpoint)
        .arg("--accuracy")
        .arg(&accuracy)
        .assert()
        .success()
        .stdout(predicate::str::contains("accuracy@10\t0.5000"));

    let table = fs::read_to_string(&accuracy).unwrap();
    let mut lines = table.lines();
    assert_eq!(
        lines.next(),
        Some("Accuracy (Top 10),Evaluated,Skipped,Failed")
    );
    assert_eq!(lines.next(), Some("0.5000,4,0,0"));
}

#[test]
fn summarize_reports_corrupt_line_with_code() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.jsonl");
    fs::write(&path, format!("{}\nnot json\n", record(0, true, true))).unwrap();

    hybench(dir.path())
        .args(["summarize", "--format", "text"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("E5001"))
        .stderr(predicate::str::contains("line 2"));
}

#[test]
fn summarize_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    hybench(dir.path())
        .args(["summarize", "nope.jsonl"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope.jsonl"));
}

// ---------------------------------------------------------------------------
// eval / check without credentials
// ---------------------------------------------------------------------------

#[test]
fn eval_without_credentials_names_the_variables() {
    let dir = TempDir::new().unwrap();
    hybench(dir.path())
        .args(["eval", "-d", "gold.csv", "--format", "text"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[E1002]"))
        .stderr(predicate::str::contains("AZURE_SEARCH_API_KEY"))
        .stderr(predicate::str::contains("AZURE_OPENAI_KEY"));
}

#[test]
fn eval_error_renders_as_json() {
    let dir = TempDir::new().unwrap();
    let output = hybench(dir.path())
        .args(["eval", "-d", "gold.csv", "--mode", "lexical", "--json"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let json: Value = serde_json::from_slice(&output.stderr).expect("JSON error on stderr");
    assert_eq!(json["error"]["error_code"], "E1002");
    let message = json["error"]["message"].as_str().unwrap();
    assert!(!message.contains("AZURE_OPENAI"));
}

#[test]
fn invalid_cutoffs_in_config_file_are_rejected() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("hybench.toml"), "[eval]\ncutoffs = [10, 5]\n").unwrap();
    hybench(dir.path())
        .args(["check", "--no-probe"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E1003"));
}

#[test]
fn check_lists_missing_variables() {
    let dir = TempDir::new().unwrap();
    hybench(dir.path())
        .args(["check", "--no-probe", "--mode", "lexical", "--rerank", "--format", "text"])
        .env("AZURE_SEARCH_SERVICE_NAME", "acme")
        .env("AZURE_SEARCH_API_KEY", "k")
        .assert()
        .failure()
        .stdout(predicate::str::contains("missing\tAZURE_SEARCH_INDEX_NAME"))
        .stdout(predicate::str::contains("missing\tCOHERE_API_KEY"))
        .stdout(predicate::str::contains("AZURE_OPENAI").not());
}

#[test]
fn check_passes_when_environment_is_complete() {
    let dir = TempDir::new().unwrap();
    hybench(dir.path())
        .args(["check", "--no-probe", "--mode", "lexical", "--format", "text"])
        .env("AZURE_SEARCH_SERVICE_NAME", "acme")
        .env("AZURE_SEARCH_API_KEY", "k")
        .env("AZURE_SEARCH_INDEX_NAME", "docs")
        .assert()
        .success()
        .stdout(predicate::str::contains("mode\tlexical"))
        .stdout(predicate::str::contains("missing").not());
}

// ---------------------------------------------------------------------------
// completions
// ---------------------------------------------------------------------------

#[test]
fn bash_completions_mention_subcommands() {
    let dir = TempDir::new().unwrap();
    hybench(dir.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("summarize"))
        .stdout(predicate::str::contains("eval"));
}
